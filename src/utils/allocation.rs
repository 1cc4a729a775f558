//! Constrained allocations used for the theoretical extremes of H2' and d'
//!
//! All of these are deterministic greedy fills: ties go to the lowest index
//! (row-major for matrices), so repeated runs give identical extremes.

/// Tolerance for "nothing left to allocate"
const REMAINDER_EPS: f64 = 1e-10;

/// Integer matrix closest to the independence expectation r_i c_j / m
///
/// Starts from the floor of the expectation and adds single units to the
/// cell furthest below its expectation whose row and column still have
/// capacity. Marginals must be integral. Returns row-major values.
pub fn integer_expectation_fill(row_totals: &[f64], column_totals: &[f64]) -> Vec<f64> {
    let n_rows = row_totals.len();
    let n_cols = column_totals.len();
    let total: f64 = row_totals.iter().sum();
    if total <= 0.0 {
        return vec![0.0; n_rows * n_cols];
    }

    let expected: Vec<f64> = row_totals
        .iter()
        .flat_map(|&r| column_totals.iter().map(move |&c| r * c / total))
        .collect();
    let mut fill: Vec<f64> = expected.iter().map(|e| e.floor()).collect();

    let mut row_rest: Vec<f64> = (0..n_rows)
        .map(|i| row_totals[i] - fill[i * n_cols..(i + 1) * n_cols].iter().sum::<f64>())
        .collect();
    let mut col_rest: Vec<f64> = (0..n_cols)
        .map(|j| column_totals[j] - (0..n_rows).map(|i| fill[i * n_cols + j]).sum::<f64>())
        .collect();

    let mut remaining = (total - fill.iter().sum::<f64>()).round() as i64;
    while remaining > 0 {
        let mut best: Option<(usize, f64)> = None;
        for i in 0..n_rows {
            if row_rest[i] < 0.5 {
                continue;
            }
            for j in 0..n_cols {
                if col_rest[j] < 0.5 {
                    continue;
                }
                let idx = i * n_cols + j;
                let deficit = expected[idx] - fill[idx];
                if best.map_or(true, |(_, d)| deficit > d) {
                    best = Some((idx, deficit));
                }
            }
        }
        // Row and column remainders always sum to the same amount, so an
        // eligible cell exists while anything remains.
        let Some((idx, _)) = best else { break };
        fill[idx] += 1.0;
        row_rest[idx / n_cols] -= 1.0;
        col_rest[idx % n_cols] -= 1.0;
        remaining -= 1;
    }

    fill
}

/// Continuous independence expectation r_i c_j / m, row-major
pub fn continuous_expectation(row_totals: &[f64], column_totals: &[f64]) -> Vec<f64> {
    let total: f64 = row_totals.iter().sum();
    if total <= 0.0 {
        return vec![0.0; row_totals.len() * column_totals.len()];
    }
    row_totals
        .iter()
        .flat_map(|&r| column_totals.iter().map(move |&c| r * c / total))
        .collect()
}

/// Most concentrated matrix with the given marginals
///
/// Repeatedly pairs the largest remaining row with the largest remaining
/// column and assigns the smaller of the two. Used for H2min.
pub fn max_marginal_assignment(row_totals: &[f64], column_totals: &[f64]) -> Vec<f64> {
    let n_cols = column_totals.len();
    let mut fill = vec![0.0; row_totals.len() * n_cols];
    let mut row_rest = row_totals.to_vec();
    let mut col_rest = column_totals.to_vec();
    let scale = row_totals.iter().sum::<f64>().max(1.0);

    loop {
        let (i, r) = argmax(&row_rest);
        let (j, c) = argmax(&col_rest);
        if r <= REMAINDER_EPS * scale || c <= REMAINDER_EPS * scale {
            break;
        }
        let amount = r.min(c);
        fill[i * n_cols + j] += amount;
        row_rest[i] -= amount;
        col_rest[j] -= amount;
    }

    fill
}

/// One species' interactions spread as evenly as possible over partners
///
/// Integer allocation of `species_total` units closest to `q_i · total`,
/// capped by each partner's availability. Used for d'min.
pub fn proportional_integer_fill(species_total: f64, availability: &[f64]) -> Vec<f64> {
    let partner_sum: f64 = availability.iter().sum();
    if partner_sum <= 0.0 {
        return vec![0.0; availability.len()];
    }
    let expected: Vec<f64> = availability
        .iter()
        .map(|&n| n / partner_sum * species_total)
        .collect();
    let mut fill: Vec<f64> = expected
        .iter()
        .zip(availability)
        .map(|(e, &n)| e.floor().min(n))
        .collect();

    let mut remaining = (species_total - fill.iter().sum::<f64>()).round() as i64;
    while remaining > 0 {
        let mut best: Option<(usize, f64)> = None;
        for (idx, (&e, &x)) in expected.iter().zip(&fill).enumerate() {
            if x + 1.0 > availability[idx] {
                continue;
            }
            let deficit = e - x;
            if best.map_or(true, |(_, d)| deficit > d) {
                best = Some((idx, deficit));
            }
        }
        let Some((idx, _)) = best else { break };
        fill[idx] += 1.0;
        remaining -= 1;
    }

    fill
}

/// One species' interactions packed onto the rarest partners
///
/// Fills partners in ascending order of availability, each up to its
/// availability, until `species_total` is used up. Used for d'max.
pub fn rarest_first_fill(species_total: f64, availability: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..availability.len()).collect();
    order.sort_by(|&a, &b| availability[a].total_cmp(&availability[b]).then(a.cmp(&b)));

    let mut fill = vec![0.0; availability.len()];
    let mut rest = species_total;
    for idx in order {
        if rest <= 0.0 {
            break;
        }
        if availability[idx] <= 0.0 {
            continue;
        }
        let amount = availability[idx].min(rest);
        fill[idx] = amount;
        rest -= amount;
    }
    fill
}

fn argmax(values: &[f64]) -> (usize, f64) {
    let mut best = (0, f64::NEG_INFINITY);
    for (idx, &v) in values.iter().enumerate() {
        if v > best.1 {
            best = (idx, v);
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_fill_respects_marginals() {
        let rows = [5.0, 5.0];
        let cols = [5.0, 5.0];
        let fill = integer_expectation_fill(&rows, &cols);
        assert_eq!(fill, vec![3.0, 2.0, 2.0, 3.0]);

        let rows = [7.0, 2.0, 1.0];
        let cols = [4.0, 6.0];
        let fill = integer_expectation_fill(&rows, &cols);
        assert_eq!(fill.iter().sum::<f64>(), 10.0);
        for (i, &r) in rows.iter().enumerate() {
            assert_eq!(fill[i * 2] + fill[i * 2 + 1], r);
        }
        for (j, &c) in cols.iter().enumerate() {
            assert_eq!((0..3).map(|i| fill[i * 2 + j]).sum::<f64>(), c);
        }
    }

    #[test]
    fn test_max_marginal_assignment() {
        let fill = max_marginal_assignment(&[2.0, 2.0], &[2.0, 2.0]);
        assert_eq!(fill, vec![2.0, 0.0, 0.0, 2.0]);

        let fill = max_marginal_assignment(&[3.0, 1.0], &[2.0, 2.0]);
        assert_eq!(fill, vec![2.0, 1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_proportional_fill() {
        // Expectation 2.5 / 2.5; leftover unit goes to the first partner
        assert_eq!(proportional_integer_fill(5.0, &[5.0, 5.0]), vec![3.0, 2.0]);
        // Capacity caps the allocation
        assert_eq!(proportional_integer_fill(3.0, &[1.0, 9.0]), vec![0.0, 3.0]);
    }

    #[test]
    fn test_rarest_first_fill() {
        assert_eq!(rarest_first_fill(4.0, &[10.0, 3.0, 5.0]), vec![0.0, 3.0, 1.0]);
        assert_eq!(rarest_first_fill(2.0, &[0.0, 4.0]), vec![0.0, 2.0]);
    }
}
