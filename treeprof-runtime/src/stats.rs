//! Cross-rank statistics for one tree node.
//!
//! Each node of the report is summarized from one value per rank (its call
//! count and its accumulated time). The spread across ranks is reported as
//! the half-width of a 90% confidence interval on the mean, using Student's
//! t distribution with `size - 1` degrees of freedom.

use crate::comm::{Communicator, ReduceOp};

/// Degrees of freedom treated as infinite: the normal-distribution limit.
const DOF_INFINITY: usize = 1000;

/// Two-sided 90% critical values of Student's t, as `(nu, t)` pairs sorted
/// by `nu`.
const T_90: [(usize, f64); 14] = [
    (0, 0.0),
    (1, 6.314),
    (2, 2.920),
    (3, 2.353),
    (4, 2.132),
    (5, 2.015),
    (7, 1.895),
    (10, 1.812),
    (15, 1.753),
    (20, 1.725),
    (30, 1.697),
    (50, 1.676),
    (100, 1.660),
    (DOF_INFINITY, 1.645),
];

/// Critical value of the 90% two-sided t distribution for `nu` degrees of
/// freedom, linearly interpolated between table entries.
pub fn t_nu(nu: usize) -> f64 {
    if nu >= DOF_INFINITY {
        return T_90[T_90.len() - 1].1;
    }
    // First entry with an abscissa >= nu; exists because nu < DOF_INFINITY.
    let upper = T_90.partition_point(|&(n, _)| n < nu);
    let (nu_up, t_up) = T_90[upper];
    if nu_up == nu {
        return t_up;
    }
    let (nu_low, t_low) = T_90[upper - 1];
    t_low + (t_up - t_low) / (nu_up - nu_low) as f64 * (nu - nu_low) as f64
}

/// Aggregated numbers for one node, identical on every rank.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeStats {
    pub total_count: u64,
    pub min_count: u64,
    pub max_count: u64,
    pub mean_count: f64,
    pub sum_time: f64,
    pub min_time: f64,
    pub max_time: f64,
    pub mean_time: f64,
    pub mean_time_per_call: f64,
    pub std_time: f64,
    /// Half-width of the 90% confidence interval on `mean_time`.
    pub ci90: f64,
}

impl NodeStats {
    /// Reduce one node's local `(count, time)` across the group.
    ///
    /// Collective: every rank must call it for the same node, in the same
    /// order. Returns `None` on every rank when no rank ever ran the node.
    pub fn gather<C: Communicator + ?Sized>(comm: &C, count: u64, time: f64) -> Option<Self> {
        let total_count = comm.all_reduce_u64(count, ReduceOp::Sum);
        if total_count == 0 {
            return None;
        }
        let size = comm.size();
        let min_count = comm.all_reduce_u64(count, ReduceOp::Min);
        let max_count = comm.all_reduce_u64(count, ReduceOp::Max);

        let sum_time = comm.all_reduce_f64(time, ReduceOp::Sum);
        let min_time = comm.all_reduce_f64(time, ReduceOp::Min);
        let max_time = comm.all_reduce_f64(time, ReduceOp::Max);
        let mean_time = sum_time / size as f64;

        let deviation = time - mean_time;
        let sum_sq = comm.all_reduce_f64(deviation * deviation, ReduceOp::Sum);
        let (std_time, ci90) = spread(sum_sq, size);

        Some(Self {
            total_count,
            min_count,
            max_count,
            mean_count: total_count as f64 / size as f64,
            sum_time,
            min_time,
            max_time,
            mean_time,
            mean_time_per_call: sum_time / total_count as f64,
            std_time,
            ci90,
        })
    }

    /// Share of `total_time` taken by the mean time, in percent.
    pub fn percent_of(&self, total_time: f64) -> f64 {
        if total_time > 0.0 {
            self.mean_time / total_time * 100.0
        } else {
            0.0
        }
    }
}

/// Sample standard deviation and 90% CI half-width from the summed squared
/// deviations of `size` samples.
fn spread(sum_sq: f64, size: usize) -> (f64, f64) {
    if size <= 1 {
        return (0.0, 0.0);
    }
    let std = (sum_sq / (size - 1) as f64).sqrt();
    let ci = std / (size as f64).sqrt() * t_nu(size - 1);
    (std, ci)
}
