//! ATR (Answer To Reset) handling

/// Historical bytes shared by both card types, followed by a one-byte
/// card-type tag
const HISTORICAL_PREFIX: &[u8] = &[
    0x80, // Category indicator: COMPACT-TLV follows
    0x31, 0x80, // Card service data: selection by full DF name
    0x73, 0x80, 0x21, 0x40, // Card capabilities: extended Lc/Le supported
    0x4D, 0x43, // "MC"
];

/// Build an ATR with specific historical bytes
pub fn build_atr(historical_bytes: &[u8]) -> Vec<u8> {
    let mut atr = Vec::with_capacity(32);

    // TS: direct convention
    atr.push(0x3B);

    // T0: TD1 present, K historical bytes (max 15)
    let hist_len = historical_bytes.len().min(15) as u8;
    atr.push(0x80 | hist_len);

    // TD1: T=1, no further interface bytes
    atr.push(0x01);

    atr.extend_from_slice(&historical_bytes[..hist_len as usize]);

    // TCK: XOR of T0 through the last historical byte, mandatory for T=1
    let tck: u8 = atr[1..].iter().fold(0u8, |acc, &b| acc ^ b);
    atr.push(tck);

    atr
}

/// ATR announcing a hospital card of the given type tag
pub fn card_atr(type_tag: u8) -> Vec<u8> {
    let mut historical = HISTORICAL_PREFIX.to_vec();
    historical.push(type_tag);
    build_atr(&historical)
}
