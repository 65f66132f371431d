//! Max-min fair division of server capacity among concurrent activities.

/// Result of dividing capacity among activities.
#[derive(Clone, Debug, PartialEq)]
pub struct FairShare {
    /// Capacity granted to each activity, in input order.
    pub grants: Vec<f64>,
    /// Whether the activity received its full demand.
    pub satisfied: Vec<bool>,
    /// The uniform share received by every unsatisfied activity.
    pub final_share: f64,
    /// Number of redistribution passes performed.
    pub passes: usize,
}

impl FairShare {
    /// Returns the sum of granted capacity.
    pub fn total(&self) -> f64 {
        self.grants.iter().sum()
    }
}

/// Divides `capacity` among activities with the given `demands` using iterative max-min fairness.
///
/// Every activity starts with an equal share. On each pass, activities whose demand fits into the
/// current share get exactly their demand and the unused part of their share is spread evenly over the
/// remaining activities. Iteration stops at the first pass that satisfies nobody new, so at most
/// `demands.len()` passes are made. Activities left unsatisfied receive the final uniform share.
///
/// When the total demand is at least `capacity`, the grants sum up to `capacity`. Otherwise every
/// activity gets exactly its demand.
pub fn max_min_fair_share(capacity: f64, demands: &[f64]) -> FairShare {
    let n = demands.len();
    if n == 0 {
        return FairShare {
            grants: Vec::new(),
            satisfied: Vec::new(),
            final_share: 0.,
            passes: 0,
        };
    }

    let mut grants = vec![0.; n];
    let mut satisfied = vec![false; n];
    let mut share = capacity / n as f64;
    let mut unsatisfied = n;
    let mut passes = 0;

    while unsatisfied > 0 {
        passes += 1;
        let mut surplus = 0.;
        let mut newly_satisfied = 0;
        for i in 0..n {
            if !satisfied[i] && demands[i] <= share {
                grants[i] = demands[i];
                satisfied[i] = true;
                surplus += share - demands[i];
                newly_satisfied += 1;
            }
        }
        if newly_satisfied == 0 {
            break;
        }
        unsatisfied -= newly_satisfied;
        if unsatisfied > 0 {
            share += surplus / unsatisfied as f64;
        }
    }

    for i in 0..n {
        if !satisfied[i] {
            grants[i] = share;
        }
    }

    FairShare {
        grants,
        satisfied,
        final_share: share,
        passes,
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::max_min_fair_share;

    #[test]
    fn test_mixed_demands() {
        let result = max_min_fair_share(1.4, &[0.5, 0.3, 0.9]);
        assert_abs_diff_eq!(result.grants[0], 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(result.grants[1], 0.3, epsilon = 1e-12);
        assert_abs_diff_eq!(result.grants[2], 0.6, epsilon = 1e-12);
        assert_eq!(result.satisfied, vec![true, true, false]);
        assert_abs_diff_eq!(result.total(), 1.4, epsilon = 1e-12);
        assert_eq!(result.passes, 3);
    }

    #[test]
    fn test_under_demand_is_exact() {
        let demands = [0.1, 0.2, 0.25];
        let result = max_min_fair_share(1.4, &demands);
        for (grant, demand) in result.grants.iter().zip(demands.iter()) {
            assert_eq!(grant, demand);
        }
        assert!(result.satisfied.iter().all(|&s| s));
        assert_eq!(result.passes, 1);
    }

    #[test]
    fn test_all_equal_overload() {
        let result = max_min_fair_share(1., &[1., 1., 1., 1.]);
        for grant in result.grants.iter() {
            assert_abs_diff_eq!(*grant, 0.25, epsilon = 1e-12);
        }
        assert_abs_diff_eq!(result.total(), 1., epsilon = 1e-12);
        assert_eq!(result.passes, 1);
    }

    #[test]
    fn test_all_equal_exact_fit() {
        let result = max_min_fair_share(1., &[0.5, 0.5]);
        assert_eq!(result.grants, vec![0.5, 0.5]);
        assert_eq!(result.passes, 1);
    }

    #[test]
    fn test_capacity_conservation() {
        let cases: Vec<(f64, Vec<f64>)> = vec![
            (1.4, vec![0.9, 0.8, 0.7]),
            (1.0, vec![0.05, 0.1, 0.9, 0.95, 0.2]),
            (1.2, vec![2., 0.01, 0.4, 0.41, 0.42, 0.43]),
            (0.7, vec![0.7]),
            (3.0, vec![1., 1., 1., 0.5]),
        ];
        for (capacity, demands) in cases {
            let total_demand: f64 = demands.iter().sum();
            assert!(total_demand >= capacity);
            let result = max_min_fair_share(capacity, &demands);
            assert_abs_diff_eq!(result.total(), capacity, epsilon = 1e-9);
            for (grant, demand) in result.grants.iter().zip(demands.iter()) {
                assert!(*grant <= *demand + 1e-9);
            }
        }
    }

    #[test]
    fn test_terminates_within_n_passes() {
        // each pass satisfies exactly one activity
        let demands = [0.11, 0.22, 0.33, 0.44, 0.55, 0.66, 0.77, 0.88];
        let result = max_min_fair_share(2.5, &demands);
        assert!(result.passes <= demands.len());
        assert_abs_diff_eq!(result.total(), 2.5, epsilon = 1e-9);

        let distinct: Vec<f64> = (1..=20).map(|i| i as f64 * 0.05).collect();
        let result = max_min_fair_share(1., &distinct);
        assert!(result.passes <= distinct.len());
    }

    #[test]
    fn test_zero_demand_and_zero_capacity() {
        let result = max_min_fair_share(1., &[0., 0.5]);
        assert_eq!(result.grants[0], 0.);
        assert!(result.satisfied[0]);
        assert_eq!(result.grants[1], 0.5);

        let result = max_min_fair_share(0., &[0.3, 0.4]);
        assert_eq!(result.grants, vec![0., 0.]);
        assert_eq!(result.satisfied, vec![false, false]);
    }

    #[test]
    fn test_empty() {
        let result = max_min_fair_share(1.4, &[]);
        assert!(result.grants.is_empty());
        assert_eq!(result.passes, 0);
    }
}
