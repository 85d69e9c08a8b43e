use super::decoder::MAX_LINE_LENGTH;
use crate::config::P1Source;
use log::{debug, error, info, warn};
use std::io;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::sync::mpsc::Sender;
use tokio_serial::{DataBits, FlowControl, Parity, SerialPortBuilderExt, StopBits};

/// Longest read for one line, the content limit plus CR LF
const READ_LIMIT: u64 = MAX_LINE_LENGTH as u64 + 2;

/// Reads lines from the reader until it ends or the receiver is gone.
///
/// Lines keep their terminator. A line longer than the limit is handed over
/// in chunks, the rest turns up as the following line.
pub async fn read_lines<R>(reader: &mut R, sender: &Sender<Vec<u8>>) -> io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut count = 0;

    loop {
        let mut line = Vec::with_capacity(128);
        let read = (&mut *reader)
            .take(READ_LIMIT)
            .read_until(b'\n', &mut line)
            .await?;

        if read == 0 {
            return Ok(count);
        }

        if sender.send(line).await.is_err() {
            debug!("Line receiver is gone, stop reading");
            return Ok(count);
        }
        count += 1;
    }
}

async fn open_source(source: &P1Source) -> io::Result<Box<dyn AsyncBufRead + Unpin + Send>> {
    match source {
        P1Source::Serial { path, baud_rate } => {
            let port = tokio_serial::new(path.to_string_lossy(), *baud_rate)
                .data_bits(DataBits::Eight)
                .parity(Parity::None)
                .stop_bits(StopBits::One)
                .flow_control(FlowControl::None)
                .open_native_async()?;
            Ok(Box::new(BufReader::new(port)))
        }
        P1Source::Tcp { host, port } => {
            let stream = tokio::net::TcpStream::connect((host.as_str(), *port)).await?;
            Ok(Box::new(BufReader::new(stream)))
        }
        P1Source::Stdin => Ok(Box::new(BufReader::new(tokio::io::stdin()))),
    }
}

/// Keeps the configured source open and forwards its lines, reopening it
/// after an error or the end of the stream.
pub async fn run_reader(source: P1Source, reconnect_delay: Duration, sender: Sender<Vec<u8>>) {
    info!("Starting P1 reader on {:?}", source);

    loop {
        match open_source(&source).await {
            Ok(mut reader) => {
                info!("P1 source {:?} opened", source);
                match read_lines(&mut reader, &sender).await {
                    Ok(count) => warn!("P1 source ended after {} lines", count),
                    Err(e) => error!("Error reading P1 source: {}", e),
                }
            }
            Err(e) => {
                error!("Unable to open P1 source {:?}: {}", source, e);
            }
        }

        if source == P1Source::Stdin {
            info!("Stdin closed, P1 reader exits");
            return;
        }
        if sender.is_closed() {
            info!("P1 reader exits, nobody is listening anymore");
            return;
        }
        tokio::time::sleep(reconnect_delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn collect(input: &[u8]) -> Vec<Vec<u8>> {
        let (tx, mut rx) = tokio::sync::mpsc::channel(64);
        let mut reader = input;
        read_lines(&mut reader, &tx).await.unwrap();
        drop(tx);

        let mut lines = Vec::new();
        while let Some(line) = rx.recv().await {
            lines.push(line);
        }
        lines
    }

    #[tokio::test]
    async fn test_lines_keep_terminator() {
        let lines = collect(b"/ISK5\\2M550T-1012\r\n1-0:1.8.1(000992.992*kWh)\r\n!1201").await;
        assert_eq!(lines, vec![
            b"/ISK5\\2M550T-1012\r\n".to_vec(),
            b"1-0:1.8.1(000992.992*kWh)\r\n".to_vec(),
            b"!1201".to_vec(),
        ]);
    }

    #[tokio::test]
    async fn test_long_line_is_split() {
        let mut input = vec![b'7'; MAX_LINE_LENGTH + 10];
        input.push(b'\n');

        let lines = collect(&input).await;
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].len(), MAX_LINE_LENGTH + 2);
        assert_eq!(lines[1].len(), 9);
        assert_eq!(lines[1].last(), Some(&b'\n'));
    }

    #[tokio::test]
    async fn test_longest_line_arrives_whole() {
        let mut input = vec![b'7'; MAX_LINE_LENGTH];
        input.extend_from_slice(b"\r\n");

        let lines = collect(&input).await;
        assert_eq!(lines, vec![input]);
    }

    #[tokio::test]
    async fn test_missing_serial_device_fails_to_open() {
        let source = P1Source::Serial { path: "/dev/does-not-exist-p1".into(), baud_rate: 115_200 };
        assert!(open_source(&source).await.is_err());
    }

    #[tokio::test]
    async fn test_reader_stops_without_receiver() {
        let (tx, rx) = tokio::sync::mpsc::channel(4);
        drop(rx);

        let mut reader: &[u8] = b"a\nb\n";
        assert_eq!(read_lines(&mut reader, &tx).await.unwrap(), 0);
    }
}
