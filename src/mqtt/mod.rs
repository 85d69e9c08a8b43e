use crate::config::MqttConfig;
use crate::p1::scheduler::{MetricSink, SinkError};
use log::{debug, error, info};
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::{Receiver, Sender};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq)]
pub struct MetricData {
    pub name: String,
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PublishData {
    pub topic: String,
    pub payload: String,
    pub qos: u8,
    pub retain: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Transmission {
    Metric(MetricData),
    Publish(PublishData),
}

fn to_qos(qos: u8) -> QoS {
    match qos {
        0 => QoS::AtMostOnce,
        1 => QoS::AtLeastOnce,
        2 => QoS::ExactlyOnce,
        _ => QoS::AtMostOnce,
    }
}

pub fn metric_topic(root_topic: &str, name: &str) -> String {
    format!("{}/{}", root_topic.trim_end_matches('/'), name)
}

pub fn alive_message(client_name: &str) -> String {
    format!("p1 meter alive: {}", client_name)
}

/// Queues the alive message from its own task. The event loop must keep
/// polling while the publish side waits for room in the client queue.
fn queue_alive(status_tx: Sender<Transmission>, alive: PublishData) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = status_tx.send(Transmission::Publish(alive)).await {
            error!("Unable to queue alive message: {}", e);
        }
    })
}

pub struct MqttManager {
    rx: Receiver<Transmission>,
    exit_thread: bool,
    client: AsyncClient,
    root_topic: String,
    qos: QoS,
}

impl MqttManager {
    pub fn new(config: &MqttConfig) -> (Self, Sender<Transmission>) {
        let (mtx, mrx) = tokio::sync::mpsc::channel(100);

        info!("MQTT connection to {}:{} starting up", config.host, config.port);
        let mut mqttoptions = MqttOptions::new(config.client_name.clone(), config.host.clone(), config.port);
        mqttoptions.set_keep_alive(Duration::from_secs(5));
        if !config.user.is_empty() {
            mqttoptions.set_credentials(config.user.clone(), config.pass.clone());
        }

        let (client, mut eventloop) = AsyncClient::new(mqttoptions, 10);

        // Drive the connection and announce ourselves on every (re)connect
        let status_tx = mtx.clone();
        let alive = PublishData {
            topic: config.status_topic.clone(),
            payload: alive_message(&config.client_name),
            qos: 0,
            retain: false,
        };
        tokio::spawn(async move {
            info!("MQTT Eventloop started");
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("Connected to MQTT broker");
                        queue_alive(status_tx.clone(), alive.clone());
                    },
                    Ok(_) => {},
                    Err(e) => {
                        error!("Error in MQTT {:?}, reconnecting ", e);
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        });

        return (MqttManager {
            rx: mrx,
            exit_thread: false,
            client,
            root_topic: config.root_topic.clone(),
            qos: to_qos(config.qos),
        }, mtx);
    }

    pub async fn start_thread(&mut self) {
        while !self.exit_thread {
            let Some(transmission) = self.rx.recv().await else {
                debug!("Reading returned none, we exit now");
                self.exit_thread = true;
                continue;
            };

            match transmission {
                Transmission::Metric(data) => {
                    let topic = metric_topic(&self.root_topic, &data.name);
                    debug!("Publishing {} to {}", data.value, topic);
                    match self.client.publish(topic, self.qos, false, data.value.to_string()).await {
                        Err(e) => { error!("Error sending: {}", e); },
                        Ok(_) => { debug!("Send successfully"); }
                    }
                },
                Transmission::Publish(publish_data) => {
                    match self.client.publish(
                        publish_data.topic,
                        to_qos(publish_data.qos),
                        publish_data.retain,
                        publish_data.payload
                    ).await {
                        Err(e) => { error!("Error publishing: {}", e); },
                        Ok(_) => { debug!("Published successfully"); }
                    }
                },
            };
        }

        info!("MQTT thread exit");
    }
}

/// Hands readings from the P1 loop over to the MQTT thread without waiting.
pub struct MqttSink {
    sender: Sender<Transmission>,
}

impl MqttSink {
    pub fn new(sender: Sender<Transmission>) -> Self {
        Self { sender }
    }
}

impl MetricSink for MqttSink {
    fn publish(&mut self, name: &str, value: i64) -> Result<(), SinkError> {
        let data = MetricData { name: name.to_string(), value };
        match self.sender.try_send(Transmission::Metric(data)) {
            Ok(_) => Ok(()),
            Err(TrySendError::Full(_)) => Err(SinkError::Full),
            Err(TrySendError::Closed(_)) => Err(SinkError::Closed),
        }
    }
}
