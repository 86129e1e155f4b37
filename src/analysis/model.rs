//! Ordinary least squares fit with the usual summary statistics

use super::linalg::invert;
use super::AnalysisError;
use ndarray::{Array1, Array2, Axis};
use serde::Serialize;
use statrs::distribution::{ContinuousCDF, FisherSnedecor, StudentsT};

/// Name of the intercept column
pub const INTERCEPT: &str = "const";

/// Result of a joint linear-restriction F-test
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FTest {
    pub fvalue: f64,
    pub pvalue: f64,
    pub df_num: usize,
    pub df_denom: usize,
}

/// A fitted OLS model
#[derive(Debug, Clone)]
pub struct OlsFit {
    pub names: Vec<String>,
    pub params: Array1<f64>,
    pub bse: Array1<f64>,
    pub tvalues: Array1<f64>,
    pub pvalues: Array1<f64>,
    /// Scaled covariance of the parameter estimates
    pub cov_params: Array2<f64>,
    pub fitted: Array1<f64>,
    pub nobs: usize,
    pub df_model: usize,
    pub df_resid: usize,
    pub ssr: f64,
    pub rsquared: f64,
    pub rsquared_adj: f64,
    /// F statistic of "all non-intercept coefficients are zero"
    pub fvalue: f64,
    pub f_pvalue: f64,
    pub llf: f64,
    pub aic: f64,
    pub bic: f64,
}

fn two_sided_t(t: f64, df: usize) -> f64 {
    if !t.is_finite() {
        return f64::NAN;
    }
    match StudentsT::new(0.0, 1.0, df as f64) {
        Ok(dist) => 2.0 * dist.sf(t.abs()),
        Err(_) => f64::NAN,
    }
}

fn f_survival(f: f64, df_num: usize, df_denom: usize) -> f64 {
    if !f.is_finite() || f < 0.0 {
        return f64::NAN;
    }
    match FisherSnedecor::new(df_num as f64, df_denom as f64) {
        Ok(dist) => dist.sf(f),
        Err(_) => f64::NAN,
    }
}

impl OlsFit {
    /// Fit `y ~ x`. `names` labels the columns of `x`; an intercept column,
    /// if any, must be named [`INTERCEPT`].
    pub fn fit(x: &Array2<f64>, y: &Array1<f64>, names: Vec<String>) -> Result<Self, AnalysisError> {
        let (n, p) = x.dim();
        if n != y.len() || p != names.len() {
            return Err(AnalysisError::Shape(format!(
                "design is {}x{}, target has {} rows, {} names",
                n,
                p,
                y.len(),
                names.len()
            )));
        }
        if n <= p {
            return Err(AnalysisError::TooFewRows { rows: n, params: p });
        }

        let xtx = x.t().dot(x);
        let xtx_inv = invert(&xtx).ok_or(AnalysisError::Singular)?;
        let params = xtx_inv.dot(&x.t().dot(y));
        let fitted = x.dot(&params);
        let resid = y - &fitted;
        let ssr = resid.dot(&resid);

        let df_resid = n - p;
        let has_const = names.iter().any(|name| name == INTERCEPT);
        let df_model = if has_const { p - 1 } else { p };
        let scale = ssr / df_resid as f64;
        let cov_params = &xtx_inv * scale;
        let bse = cov_params.diag().mapv(f64::sqrt);
        let tvalues = &params / &bse;
        let pvalues = tvalues.mapv(|t| two_sided_t(t, df_resid));

        let nf = n as f64;
        let tss = if has_const {
            let mean = y.mean().unwrap_or(0.0);
            y.iter().map(|v| (v - mean).powi(2)).sum::<f64>()
        } else {
            y.dot(y)
        };
        let rsquared = 1.0 - ssr / tss;
        let df_total = if has_const { nf - 1.0 } else { nf };
        let rsquared_adj = 1.0 - (1.0 - rsquared) * df_total / df_resid as f64;

        let llf = -nf / 2.0 * ((2.0 * std::f64::consts::PI).ln() + (ssr / nf).ln() + 1.0);
        let k = p as f64;
        let aic = -2.0 * llf + 2.0 * k;
        let bic = -2.0 * llf + k * nf.ln();

        let mut fit = Self {
            names,
            params,
            bse,
            tvalues,
            pvalues,
            cov_params,
            fitted,
            nobs: n,
            df_model,
            df_resid,
            ssr,
            rsquared,
            rsquared_adj,
            fvalue: f64::NAN,
            f_pvalue: f64::NAN,
            llf,
            aic,
            bic,
        };

        let covariates: Vec<String> = fit
            .names
            .iter()
            .filter(|name| *name != INTERCEPT)
            .cloned()
            .collect();
        if let Some(test) = fit.f_test(&covariates) {
            fit.fvalue = test.fvalue;
            fit.f_pvalue = test.pvalue;
        }
        Ok(fit)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn param(&self, name: &str) -> Option<f64> {
        self.index_of(name).map(|i| self.params[i])
    }

    pub fn pvalue(&self, name: &str) -> Option<f64> {
        self.index_of(name).map(|i| self.pvalues[i])
    }

    pub fn predict(&self, x: &Array2<f64>) -> Array1<f64> {
        x.dot(&self.params)
    }

    /// Joint test that the named coefficients are all zero.
    ///
    /// Returns `None` when no names are given, a name is unknown, or the
    /// restriction covariance is singular.
    pub fn f_test<S: AsRef<str>>(&self, names: &[S]) -> Option<FTest> {
        if names.is_empty() {
            return None;
        }
        let idx: Vec<usize> = names
            .iter()
            .map(|n| self.index_of(n.as_ref()))
            .collect::<Option<_>>()?;
        let q = idx.len();

        let rb = self.params.select(Axis(0), &idx);
        let rcr = self.cov_params.select(Axis(0), &idx).select(Axis(1), &idx);
        let rcr_inv = invert(&rcr)?;
        let fvalue = rb.dot(&rcr_inv.dot(&rb)) / q as f64;

        Some(FTest {
            fvalue,
            pvalue: f_survival(fvalue, q, self.df_resid),
            df_num: q,
            df_denom: self.df_resid,
        })
    }
}
