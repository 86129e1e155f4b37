//! Grouped F-tests, the significant-covariate set, partial fits and
//! Benjamini-Hochberg correction

use super::design::DesignMatrix;
use super::model::{FTest, OlsFit, INTERCEPT};
use serde::Serialize;

/// Name prefixes whose members are tested jointly
pub const DEFAULT_GROUPS: [&str; 3] = ["Shim", "IOPD", "Seasonal"];

/// Adjusted p-values within this distance of alpha still reject
const ALPHA_TOLERANCE: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupTest {
    pub prefix: String,
    pub members: Vec<String>,
    /// `None` when no covariate carries the prefix or the restriction is singular
    pub test: Option<FTest>,
}

impl GroupTest {
    pub fn rejects(&self, alpha: f64) -> bool {
        self.test.map(|t| t.pvalue < alpha).unwrap_or(false)
    }
}

fn group_of<'a>(name: &str, prefixes: &'a [String]) -> Option<&'a str> {
    prefixes
        .iter()
        .find(|p| name.starts_with(p.as_str()))
        .map(|p| p.as_str())
}

/// Joint zero test for each prefix over the covariates that carry it
pub fn group_tests(fit: &OlsFit, prefixes: &[String]) -> Vec<GroupTest> {
    prefixes
        .iter()
        .map(|prefix| {
            let members: Vec<String> = fit
                .names
                .iter()
                .filter(|n| group_of(n, prefixes) == Some(prefix.as_str()))
                .cloned()
                .collect();
            let test = fit.f_test(&members);
            GroupTest {
                prefix: prefix.clone(),
                members,
                test,
            }
        })
        .collect()
}

/// Covariates outside any group with p < alpha, all members of rejected
/// groups, and the intercept. Model order is preserved.
pub fn significant_variables(fit: &OlsFit, groups: &[GroupTest], prefixes: &[String], alpha: f64) -> Vec<String> {
    fit.names
        .iter()
        .enumerate()
        .filter(|(i, name)| {
            if name.as_str() == INTERCEPT {
                return true;
            }
            match group_of(name, prefixes) {
                Some(prefix) => groups.iter().any(|g| g.prefix == prefix && g.rejects(alpha)),
                None => fit.pvalues[*i] < alpha,
            }
        })
        .map(|(_, name)| name.clone())
        .collect()
}

/// Contribution of one significant covariate: its column times its
/// coefficient, every other column zeroed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialFit {
    pub name: String,
    pub values: Vec<f64>,
}

pub fn partial_fits(design: &DesignMatrix, fit: &OlsFit, significant: &[String]) -> Vec<PartialFit> {
    significant
        .iter()
        .filter_map(|name| {
            let j = fit.index_of(name)?;
            let coef = fit.params[j];
            Some(PartialFit {
                name: name.clone(),
                values: design.x.column(j).iter().map(|v| v * coef).collect(),
            })
        })
        .collect()
}

/// Step-up Benjamini-Hochberg adjustment. Returns the adjusted p-values in
/// input order; NaN inputs stay NaN and are not counted.
pub fn benjamini_hochberg(pvalues: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..pvalues.len()).filter(|&i| pvalues[i].is_finite()).collect();
    order.sort_by(|&a, &b| pvalues[a].total_cmp(&pvalues[b]));
    let m = order.len() as f64;

    let mut adjusted = vec![f64::NAN; pvalues.len()];
    let mut running_min = 1.0_f64;
    for (rank, &i) in order.iter().enumerate().rev() {
        let scaled = pvalues[i] * m / (rank + 1) as f64;
        running_min = running_min.min(scaled);
        adjusted[i] = running_min;
    }
    adjusted
}

/// Whether an adjusted p-value clears `alpha`
pub fn rejects(adjusted: f64, alpha: f64) -> bool {
    adjusted <= alpha + ALPHA_TOLERANCE
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FdrEntry {
    /// Covariate name, or the group prefix for a joint test
    pub name: String,
    pub is_group: bool,
    pub pvalue: f64,
    pub adjusted: f64,
    pub significant: bool,
}

/// Pool the per-covariate p-values of ungrouped covariates with one p-value
/// per tested group and correct them together.
pub fn fdr_table(fit: &OlsFit, groups: &[GroupTest], prefixes: &[String], alpha: f64) -> Vec<FdrEntry> {
    let mut pool: Vec<(String, bool, f64)> = fit
        .names
        .iter()
        .zip(fit.pvalues.iter())
        .filter(|(name, _)| name.as_str() != INTERCEPT && group_of(name, prefixes).is_none())
        .map(|(name, p)| (name.clone(), false, *p))
        .collect();
    pool.extend(
        groups
            .iter()
            .filter_map(|g| g.test.map(|t| (g.prefix.clone(), true, t.pvalue))),
    );
    pool.retain(|(_, _, p)| p.is_finite());

    let raw: Vec<f64> = pool.iter().map(|(_, _, p)| *p).collect();
    let adjusted = benjamini_hochberg(&raw);
    pool.into_iter()
        .zip(adjusted)
        .map(|((name, is_group, pvalue), adjusted)| FdrEntry {
            name,
            is_group,
            pvalue,
            adjusted,
            significant: pvalue < alpha && rejects(adjusted, alpha),
        })
        .collect()
}
