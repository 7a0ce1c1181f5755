//! Task attributes in canonical order.

use core::fmt;
use core::str::FromStr;

use crate::error::{Error, Result};

/// One named attribute of a [`Task`](crate::Task).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Attribute {
    /// Averaging mode for item-grouped correlations
    AvgBy,
    /// Block size for early-stopping permutation tests
    BlockSize,
    /// Reference sets close to the primary references
    CloseRefs,
    /// Correlation function identifier
    CorrFcn,
    /// Extra correlation function arguments
    CorrFcnArgs,
    /// Optional domain filter
    Domain,
    /// Upper early-stop bound
    EarlyMax,
    /// Lower early-stop bound
    EarlyMin,
    /// Gold score label
    Gold,
    /// Whether human outputs are compared as systems
    Human,
    /// Resampling count
    K,
    /// Language pair, or comma-joined pairs in accuracy mode
    Lang,
    /// Scoring granularity
    Level,
    /// Permutation strategy
    PermTest,
    /// Primary submissions only
    Primary,
    /// Significance threshold
    Pval,
    /// Reference sets
    Refs,
    /// Replace NaN scores with zeros
    ReplaceNansWithZeros,
    /// Test set identifier
    TestSet,
    /// Include outlier systems
    UseOutliers,
}

impl Attribute {
    /// All attributes in canonical order. Task names list attributes in this order.
    pub const ALL: [Self; 20] = [
        Self::AvgBy,
        Self::BlockSize,
        Self::CloseRefs,
        Self::CorrFcn,
        Self::CorrFcnArgs,
        Self::Domain,
        Self::EarlyMax,
        Self::EarlyMin,
        Self::Gold,
        Self::Human,
        Self::K,
        Self::Lang,
        Self::Level,
        Self::PermTest,
        Self::Primary,
        Self::Pval,
        Self::Refs,
        Self::ReplaceNansWithZeros,
        Self::TestSet,
        Self::UseOutliers,
    ];

    /// Attribute name as used in task names and configuration files.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AvgBy => "avg_by",
            Self::BlockSize => "block_size",
            Self::CloseRefs => "close_refs",
            Self::CorrFcn => "corr_fcn",
            Self::CorrFcnArgs => "corr_fcn_args",
            Self::Domain => "domain",
            Self::EarlyMax => "early_max",
            Self::EarlyMin => "early_min",
            Self::Gold => "gold",
            Self::Human => "human",
            Self::K => "k",
            Self::Lang => "lang",
            Self::Level => "level",
            Self::PermTest => "perm_test",
            Self::Primary => "primary",
            Self::Pval => "pval",
            Self::Refs => "refs",
            Self::ReplaceNansWithZeros => "replace_nans_with_zeros",
            Self::TestSet => "test_set",
            Self::UseOutliers => "use_outliers",
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for Attribute {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|attr| attr.as_str() == name)
            .ok_or_else(|| Error::UnknownAttribute(name.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_order_is_sorted_by_name() {
        let names: Vec<_> = Attribute::ALL.iter().map(|attr| attr.as_str()).collect();
        let mut sorted = names.clone();
        sorted.sort_unstable();
        assert_eq!(names, sorted);
    }

    #[test]
    fn test_parse_round_trip() {
        for attr in Attribute::ALL {
            assert_eq!(attr.as_str().parse::<Attribute>().unwrap(), attr);
        }
    }

    #[test]
    fn test_parse_unknown() {
        let error = "colour".parse::<Attribute>().unwrap_err();
        assert!(matches!(error, Error::UnknownAttribute(name) if name == "colour"));
    }
}
