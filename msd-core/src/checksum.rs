//! The order-independent router checksum from spec §4.3: MD5 each address
//! independently, then byte-wise add (wrapping, mod 256) across all of
//! them. Two nodes that learn about the same set of providers in a
//! different order converge on the same 16 bytes.

/// Computes the checksum for a set of addresses. Empty input yields all
/// zero bytes (the "no providers" checksum, never surfaced since a
/// `Router` with empty `addrs` is deleted rather than kept).
pub fn router_checksum<'a>(addrs: impl IntoIterator<Item = &'a str>) -> [u8; 16] {
    let mut sum = [0u8; 16];
    for addr in addrs {
        let digest = md5::compute(addr.as_bytes()).0;
        for i in 0..16 {
            sum[i] = sum[i].wrapping_add(digest[i]);
        }
    }
    sum
}

/// Combines already-computed router checksums (used when aggregating a
/// consumer's router subtable), the same wrapping byte-wise add.
pub fn combine_checksums<'a>(checksums: impl IntoIterator<Item = &'a [u8; 16]>) -> [u8; 16] {
    let mut sum = [0u8; 16];
    for cs in checksums {
        for i in 0..16 {
            sum[i] = sum[i].wrapping_add(cs[i]);
        }
    }
    sum
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_addr_is_its_md5() {
        let cs = router_checksum(["http://a:1/rs"]);
        let expect = md5::compute(b"http://a:1/rs").0;
        assert_eq!(cs, expect);
    }

    #[test]
    fn order_independent() {
        let a = router_checksum(["http://a:1/rs", "http://b:2/rs", "http://c:3/rs"]);
        let b = router_checksum(["http://c:3/rs", "http://a:1/rs", "http://b:2/rs"]);
        assert_eq!(a, b);
    }

    #[test]
    fn empty_is_zero() {
        assert_eq!(router_checksum(std::iter::empty()), [0u8; 16]);
    }
}
