use crate::entities::BandwidthClass;

/// `mwan3` member weight for an account of the given bandwidth class.
///
/// Weights stay proportional to line speed so traffic is shared roughly by
/// capacity.
pub fn from_bandwidth(bandwidth: BandwidthClass) -> u32 {
    match bandwidth {
        BandwidthClass::Mbps20 => 2,
        BandwidthClass::Mbps50 => 5,
        BandwidthClass::Mbps100 => 10,
        BandwidthClass::Mbps200 => 20,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weights_grow_with_bandwidth() {
        let w: Vec<u32> = [
            BandwidthClass::Mbps20,
            BandwidthClass::Mbps50,
            BandwidthClass::Mbps100,
            BandwidthClass::Mbps200,
        ]
        .into_iter()
        .map(from_bandwidth)
        .collect();
        assert_eq!(w, vec![2, 5, 10, 20]);
    }
}
