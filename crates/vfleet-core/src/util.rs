//! Small helpers shared by the builders.

use rand::Rng;

/// A random MAC address in the locally administered QEMU range `52:54:00`.
pub fn random_mac() -> String {
    let mut rng = rand::rng();
    format!(
        "52:54:00:{:02x}:{:02x}:{:02x}",
        rng.random::<u8>(),
        rng.random::<u8>(),
        rng.random::<u8>()
    )
}

/// A random bridge device name, `virbr<n>` with `n` below `0xffffffff`.
pub fn random_bridge_name() -> String {
    let n: u32 = rand::rng().random_range(0..u32::MAX);
    format!("virbr{n}")
}

/// Normalize a disk size for `qemu-img`.
///
/// Sizes starting with `<N>Gi` become the byte count `N * 1000^3` (decimal,
/// not binary, to match disks already provisioned this way). Anything else is
/// passed through.
pub fn canonical_size(size: &str) -> String {
    let digits: String = size.chars().take_while(|c| c.is_ascii_digit()).collect();
    if !digits.is_empty() && size[digits.len()..].starts_with("Gi") {
        if let Ok(n) = digits.parse::<u64>() {
            if let Some(bytes) = n.checked_mul(1_000_000_000) {
                return bytes.to_string();
            }
        }
    }
    size.to_string()
}

/// Guest device name of the `index`-th virtio disk: `vda`, `vdb`, ...
pub fn disk_device_name(index: usize) -> Option<String> {
    let letter = (b'a' as usize).checked_add(index)?;
    if letter > b'z' as usize {
        return None;
    }
    Some(format!("vd{}", letter as u8 as char))
}
