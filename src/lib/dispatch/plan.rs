use super::types::BatchPlan;

impl BatchPlan {
    /// Splits `desired` into batches of at most `limit`, remainder last.
    pub fn new(desired: usize, limit: usize) -> Self {
        BatchPlan {
            desired,
            limit: limit.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.desired.div_ceil(self.limit)
    }

    pub fn is_empty(&self) -> bool {
        self.desired == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + use<> {
        let limit = self.limit;
        let mut remaining = self.desired;
        std::iter::from_fn(move || {
            if remaining == 0 {
                return None;
            }
            let current = remaining.min(limit);
            remaining -= current;
            Some(current)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batches(desired: usize, limit: usize) -> Vec<usize> {
        BatchPlan::new(desired, limit).iter().collect()
    }

    #[test]
    fn twenty_five_by_ten() {
        assert_eq!(batches(25, 10), vec![10, 10, 5]);
        assert_eq!(BatchPlan::new(25, 10).len(), 3);
    }

    #[test]
    fn zero_is_empty() {
        assert!(batches(0, 10).is_empty());
        assert_eq!(BatchPlan::new(0, 10).len(), 0);
    }

    #[test]
    fn sums_and_bounds_hold_for_many_counts() {
        for limit in [1, 3, 10] {
            for desired in 0..=57 {
                let plan = batches(desired, limit);
                assert_eq!(plan.iter().sum::<usize>(), desired);
                assert!(plan.iter().all(|&b| b > 0 && b <= limit));

                let short: Vec<usize> = plan.iter().copied().filter(|&b| b < limit).collect();
                if desired % limit == 0 {
                    assert!(short.is_empty());
                } else {
                    assert_eq!(short, vec![desired % limit]);
                    assert_eq!(plan.last().copied(), Some(desired % limit));
                }
            }
        }
    }

    #[test]
    fn huge_counts_do_not_allocate_up_front() {
        for desired in [usize::MAX, 10_000_000_000_000_000] {
            let plan = BatchPlan::new(desired, 10);
            assert_eq!(plan.len(), desired.div_ceil(10));
            assert_eq!(plan.iter().take(3).collect::<Vec<_>>(), vec![10, 10, 10]);
        }
    }

    #[test]
    fn zero_limit_is_treated_as_one() {
        assert_eq!(batches(2, 0), vec![1, 1]);
    }
}
