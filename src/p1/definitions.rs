use super::registry::MetricDefinition;

/// Readings published when the configuration does not list its own.
///
/// Codes follow the Dutch DSMR 5.0 P1 companion standard, gas as sent by
/// Belgian meters.
pub fn default_metric_definitions() -> Vec<MetricDefinition> {
    vec![
        // 1-0:1.8.1(000992.992*kWh) consumption low tariff
        MetricDefinition::with_unit("consumption_tarif_1", "1-0:1.8.1"),
        // 1-0:1.8.2(000560.157*kWh) consumption high tariff
        MetricDefinition::with_unit("consumption_tarif_2", "1-0:1.8.2"),
        // 1-0:2.8.1(000000.000*kWh) returned low tariff
        MetricDefinition::with_unit("received_tarif_1", "1-0:2.8.1"),
        MetricDefinition::with_unit("received_tarif_2", "1-0:2.8.2"),

        // 1-0:1.7.0(00.424*kW) actual power delivered to the house
        MetricDefinition::with_unit("actual_consumption", "1-0:1.7.0"),
        // 1-0:2.7.0(00.000*kW) actual power returned to the grid
        MetricDefinition::with_unit("actual_received", "1-0:2.7.0"),

        // 1-0:21.7.0(00.378*kW) per phase
        MetricDefinition::with_unit("instant_power_usage_l1", "1-0:21.7.0"),
        MetricDefinition::with_unit("instant_power_usage_l2", "1-0:41.7.0"),
        MetricDefinition::with_unit("instant_power_usage_l3", "1-0:61.7.0"),
        MetricDefinition::with_unit("instant_power_return_l1", "1-0:22.7.0"),
        MetricDefinition::with_unit("instant_power_return_l2", "1-0:42.7.0"),
        MetricDefinition::with_unit("instant_power_return_l3", "1-0:62.7.0"),

        // 1-0:31.7.0(002*A)
        MetricDefinition::with_unit("instant_power_current_l1", "1-0:31.7.0"),
        MetricDefinition::with_unit("instant_power_current_l2", "1-0:51.7.0"),
        MetricDefinition::with_unit("instant_power_current_l3", "1-0:71.7.0"),

        // 1-0:32.7.0(232.0*V)
        MetricDefinition::with_unit("instant_voltage_l1", "1-0:32.7.0"),
        MetricDefinition::with_unit("instant_voltage_l2", "1-0:52.7.0"),
        MetricDefinition::with_unit("instant_voltage_l3", "1-0:72.7.0"),

        // 0-0:96.14.0(0001) no unit, plain number
        MetricDefinition::new("actual_tarif_group", "0-0:96.14.0"),

        // 0-1:24.2.3(150531200000S)(00811.923*m3)
        MetricDefinition::with_unit("gas_meter_m3", "0-1:24.2.3"),
    ]
}

/// DSMR 5 telegram with a known good checksum, lines as the meter sends them.
#[cfg(test)]
pub(crate) const EXAMPLE_TELEGRAM: [&str; 16] = [
    "/ISK5\\2M550T-1012\r\n",
    "1-3:0.2.8(50)\r\n",
    "0-0:1.0.0(200408063501S)\r\n",
    "1-0:1.8.1(000992.992*kWh)\r\n",
    "1-0:1.8.2(000560.157*kWh)\r\n",
    "1-0:2.8.1(000000.000*kWh)\r\n",
    "1-0:2.8.2(000000.000*kWh)\r\n",
    "0-0:96.14.0(0001)\r\n",
    "1-0:1.7.0(00.424*kW)\r\n",
    "1-0:2.7.0(00.000*kW)\r\n",
    "1-0:32.7.0(232.0*V)\r\n",
    "1-0:31.7.0(002*A)\r\n",
    "1-0:21.7.0(00.378*kW)\r\n",
    "1-0:22.7.0(00.000*kW)\r\n",
    "0-1:24.2.3(150531200000S)(00811.923*m3)\r\n",
    "!1201\r\n",
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::obis_utils::validate_obis_code;
    use crate::p1::registry::MetricRegistry;

    #[test]
    fn test_default_definitions_register() {
        let registry = MetricRegistry::from_definitions(default_metric_definitions()).unwrap();
        assert_eq!(registry.len(), 20);

        // both sides of the meter have their own slot
        for code in ["1-0:1.8.1", "1-0:1.8.2", "1-0:2.8.1", "1-0:2.8.2",
                     "1-0:21.7.0", "1-0:41.7.0", "1-0:61.7.0",
                     "1-0:22.7.0", "1-0:42.7.0", "1-0:62.7.0"] {
            assert!(registry.find_by_code(code).is_some(), "{code} missing");
        }
    }

    #[test]
    fn test_default_codes_are_valid_obis() {
        for definition in default_metric_definitions() {
            assert!(validate_obis_code(&definition.code), "{}", definition.code);
        }
    }

    #[test]
    fn test_gas_uses_unit_delimiter() {
        let gas = default_metric_definitions().into_iter()
            .find(|d| d.name == "gas_meter_m3")
            .unwrap();
        assert_eq!(gas.end_delimiter, '*');
    }
}
