//! IANA protocol number lookup, used to fill `protocol_name` on the
//! emitted feature vector.

/// Human-readable protocol name for the emitted feature vector.
///
/// Only ICMP, TCP, UDP, GRE and ESP get a mnemonic name; everything else is
/// rendered as `UNKNOWN_<n>` using the raw protocol number.
pub fn feature_name(protocol: u8) -> String {
    match protocol {
        1 => "ICMP".to_string(),
        6 => "TCP".to_string(),
        17 => "UDP".to_string(),
        47 => "GRE".to_string(),
        50 => "ESP".to_string(),
        n => format!("UNKNOWN_{n}"),
    }
}
