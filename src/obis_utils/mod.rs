use lazy_static::lazy_static;
use std::collections::HashMap;

lazy_static! {
    static ref OBIS_DESCRIPTIONS: HashMap<&'static str, &'static str> = get_dsmr_obis_descriptions();
}

pub fn get_obis_description(obis_code: &str) -> Option<&'static str> {
    OBIS_DESCRIPTIONS.get(obis_code).copied()
}

fn get_dsmr_obis_descriptions() -> HashMap<&'static str, &'static str> {
    let mut map = HashMap::new();

    // Header and identification
    map.insert("1-3:0.2.8", "DSMR version");
    map.insert("0-0:1.0.0", "Date and time");
    map.insert("0-0:96.1.1", "Equipment identifier");

    // Energy values
    map.insert("1-0:1.8.1", "Energy delivered to client (tariff 1)");
    map.insert("1-0:1.8.2", "Energy delivered to client (tariff 2)");
    map.insert("1-0:2.8.1", "Energy delivered by client (tariff 1)");
    map.insert("1-0:2.8.2", "Energy delivered by client (tariff 2)");
    map.insert("0-0:96.14.0", "Tariff indicator");

    // Power values
    map.insert("1-0:1.7.0", "Actual power delivered");
    map.insert("1-0:2.7.0", "Actual power received");
    map.insert("1-0:21.7.0", "Instantaneous active power + (L1)");
    map.insert("1-0:41.7.0", "Instantaneous active power + (L2)");
    map.insert("1-0:61.7.0", "Instantaneous active power + (L3)");
    map.insert("1-0:22.7.0", "Instantaneous active power - (L1)");
    map.insert("1-0:42.7.0", "Instantaneous active power - (L2)");
    map.insert("1-0:62.7.0", "Instantaneous active power - (L3)");

    // Voltage values
    map.insert("1-0:32.7.0", "Voltage (L1)");
    map.insert("1-0:52.7.0", "Voltage (L2)");
    map.insert("1-0:72.7.0", "Voltage (L3)");

    // Current values
    map.insert("1-0:31.7.0", "Current (L1)");
    map.insert("1-0:51.7.0", "Current (L2)");
    map.insert("1-0:71.7.0", "Current (L3)");

    // Power quality
    map.insert("0-0:96.7.21", "Number of power failures");
    map.insert("0-0:96.7.9", "Number of long power failures");
    map.insert("1-0:32.32.0", "Number of voltage sags (L1)");
    map.insert("1-0:52.32.0", "Number of voltage sags (L2)");
    map.insert("1-0:72.32.0", "Number of voltage sags (L3)");

    // M-Bus devices
    map.insert("0-1:24.1.0", "M-Bus device type");
    map.insert("0-1:24.2.1", "Gas delivered");
    map.insert("0-1:24.2.3", "Gas delivered (Belgium)");

    map
}

/// Checks a code the way it shows up at the start of a P1 line,
/// `A-B:C.D.E` with every group a number up to 255. The storage group `*F`
/// never appears on the wire, a code carrying it would never match.
pub fn validate_obis_code(code: &str) -> bool {
    let Some((medium, quantity)) = code.split_once(':') else {
        return false;
    };
    let Some((a, b)) = medium.split_once('-') else {
        return false;
    };
    let groups: Vec<&str> = quantity.split('.').collect();
    if groups.len() != 3 {
        return false;
    }

    [a, b].iter().chain(groups.iter()).all(|group| {
        !group.is_empty() && group.bytes().all(|c| c.is_ascii_digit()) && group.parse::<u8>().is_ok()
    })
}

pub fn normalize_obis_code(code: &str) -> String {
    code.trim().replace(' ', "")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_obis_code() {
        assert!(validate_obis_code("1-0:1.8.1"));
        assert!(validate_obis_code("0-0:96.14.0"));
        assert!(validate_obis_code("0-1:24.2.3"));
        assert!(!validate_obis_code("invalid"));
        assert!(!validate_obis_code("1:2.3.4"));
        assert!(!validate_obis_code("1-0:1.8"));
        assert!(!validate_obis_code("1-0:1.8.256"));
        assert!(!validate_obis_code("1-0:1.8.1*255"));
        assert!(!validate_obis_code("1-0-0:1.8.1"));
        assert!(!validate_obis_code("1-0:+1.8.1"));
    }

    #[test]
    fn test_get_obis_description() {
        assert_eq!(get_obis_description("1-0:2.8.1"), Some("Energy delivered by client (tariff 1)"));
        assert_eq!(get_obis_description("0-1:24.2.3"), Some("Gas delivered (Belgium)"));
        assert_eq!(get_obis_description("nonexistent"), None);
    }

    #[test]
    fn test_normalize_obis_code() {
        assert_eq!(normalize_obis_code("  1-0:1.8.1  "), "1-0:1.8.1");
        assert_eq!(normalize_obis_code("1-0: 15.7.0"), "1-0:15.7.0");
    }
}
