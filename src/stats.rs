use std::sync::atomic::{AtomicU64, Ordering};

/// Counters updated while component artifacts are written in parallel
#[derive(Default)]
pub struct BuildStats {
    pub components_written: AtomicU64,
    pub nodes_written: AtomicU64,
    pub edges_written: AtomicU64,
    pub bytes_written: AtomicU64,
    pub missing_attributes: AtomicU64,
}

impl BuildStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_components(&self) {
        self.components_written.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_nodes(&self, count: u64) {
        self.nodes_written.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_edges(&self, count: u64) {
        self.edges_written.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_bytes(&self, count: u64) {
        self.bytes_written.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_missing_attributes(&self, count: u64) {
        self.missing_attributes.fetch_add(count, Ordering::Relaxed);
    }

    pub fn components(&self) -> u64 {
        self.components_written.load(Ordering::Relaxed)
    }

    pub fn nodes(&self) -> u64 {
        self.nodes_written.load(Ordering::Relaxed)
    }

    pub fn edges(&self) -> u64 {
        self.edges_written.load(Ordering::Relaxed)
    }

    pub fn bytes(&self) -> u64 {
        self.bytes_written.load(Ordering::Relaxed)
    }

    pub fn missing(&self) -> u64 {
        self.missing_attributes.load(Ordering::Relaxed)
    }
}

/// Histogram of component sizes in nodes.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SizeDistribution {
    pub under_10: usize,
    pub from_10_to_100: usize,
    pub from_100_to_1k: usize,
    pub from_1k_to_10k: usize,
    pub over_10k: usize,
}

impl SizeDistribution {
    pub fn from_sizes(sizes: impl IntoIterator<Item = usize>) -> Self {
        let mut dist = Self::default();
        for nodes in sizes {
            match nodes {
                0..=9 => dist.under_10 += 1,
                10..=99 => dist.from_10_to_100 += 1,
                100..=999 => dist.from_100_to_1k += 1,
                1000..=9999 => dist.from_1k_to_10k += 1,
                _ => dist.over_10k += 1,
            }
        }
        dist
    }

    pub fn rows(&self) -> [(&'static str, usize); 5] {
        [
            ("< 10", self.under_10),
            ("10-100", self.from_10_to_100),
            ("100-1K", self.from_100_to_1k),
            ("1K-10K", self.from_1k_to_10k),
            ("> 10K", self.over_10k),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values_are_zero() {
        let stats = BuildStats::new();
        assert_eq!(stats.components(), 0);
        assert_eq!(stats.nodes(), 0);
        assert_eq!(stats.edges(), 0);
        assert_eq!(stats.bytes(), 0);
        assert_eq!(stats.missing(), 0);
    }

    #[test]
    fn mixed_operations() {
        let stats = BuildStats::new();
        stats.inc_components();
        stats.add_nodes(10);
        stats.add_edges(9);
        stats.add_bytes(512);
        stats.inc_components();
        stats.add_nodes(1);
        stats.add_missing_attributes(3);

        assert_eq!(stats.components(), 2);
        assert_eq!(stats.nodes(), 11);
        assert_eq!(stats.edges(), 9);
        assert_eq!(stats.bytes(), 512);
        assert_eq!(stats.missing(), 3);
    }

    #[test]
    fn size_distribution_bucket_edges() {
        let dist = SizeDistribution::from_sizes([1, 9, 10, 99, 100, 999, 1000, 9999, 10000]);
        assert_eq!(
            dist,
            SizeDistribution {
                under_10: 2,
                from_10_to_100: 2,
                from_100_to_1k: 2,
                from_1k_to_10k: 2,
                over_10k: 1,
            }
        );
    }

    #[test]
    fn size_distribution_of_nothing() {
        let dist = SizeDistribution::from_sizes(Vec::new());
        assert!(dist.rows().iter().all(|(_, count)| *count == 0));
    }
}
