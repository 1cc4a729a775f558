//! Entropy and divergence helpers shared by H2' and d'

/// Shannon entropy of cell values relative to `total`
///
/// H = -Σ (v/total) ln(v/total), zero cells contribute nothing.
pub fn shannon_entropy(values: &[f64], total: f64) -> f64 {
    if total <= 0.0 {
        return 0.0;
    }
    values
        .iter()
        .filter(|&&v| v > 0.0)
        .map(|&v| {
            let p = v / total;
            -p * p.ln()
        })
        .sum()
}

/// Kullback-Leibler divergence of an interaction vector from availabilities
///
/// `counts` are one species' interactions per partner; `q` are the partner
/// proportions expected under no preference. Partners with zero
/// interactions are skipped (0 · ln 0 = 0).
pub fn kl_divergence(counts: &[f64], q: &[f64]) -> f64 {
    let total: f64 = counts.iter().sum();
    if total <= 0.0 {
        return 0.0;
    }
    counts
        .iter()
        .zip(q)
        .filter(|(&c, _)| c > 0.0)
        .map(|(&c, &qi)| {
            let p = c / total;
            p * (p / qi).ln()
        })
        .sum()
}
