// src/core/scoring.rs

use crate::core::models::{Finding, SecurityFeatureSet};

pub const MAX_RISK_SCORE: u32 = 100;

const DNSSEC_BONUS: u32 = 5;
const SPF_BONUS: u32 = 3;
const DMARC_BONUS: u32 = 3;
const DKIM_BONUS: u32 = 2;
const CAA_BONUS: u32 = 2;

/// Severity-weighted sum of all findings, capped at 100.
pub fn web_risk_score(findings: &[Finding]) -> u8 {
    capped_weight(findings) as u8
}

/// Like [`web_risk_score`], then reduced by a fixed bonus per enabled security
/// feature and floored at zero.
pub fn dns_risk_score(findings: &[Finding], features: &SecurityFeatureSet) -> u8 {
    let bonus = [
        (features.dnssec_enabled, DNSSEC_BONUS),
        (features.spf_configured, SPF_BONUS),
        (features.dmarc_configured, DMARC_BONUS),
        (features.dkim_configured, DKIM_BONUS),
        (features.caa_configured, CAA_BONUS),
    ]
    .iter()
    .filter(|(enabled, _)| *enabled)
    .map(|(_, points)| points)
    .sum::<u32>();

    capped_weight(findings).saturating_sub(bonus) as u8
}

fn capped_weight(findings: &[Finding]) -> u32 {
    findings
        .iter()
        .map(|f| f.severity.weight())
        .sum::<u32>()
        .min(MAX_RISK_SCORE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::{FindingKind, Severity};

    fn findings(severities: &[Severity]) -> Vec<Finding> {
        severities
            .iter()
            .map(|s| Finding::new(FindingKind::MissingSecurityHeader, *s, "", "", ""))
            .collect()
    }

    #[test]
    fn empty_scan_scores_zero() {
        assert_eq!(web_risk_score(&[]), 0);
        assert_eq!(dns_risk_score(&[], &SecurityFeatureSet::default()), 0);
    }

    #[test]
    fn weights_are_summed() {
        let list = findings(&[Severity::Critical, Severity::High, Severity::Medium, Severity::Low]);
        assert_eq!(web_risk_score(&list), 25 + 15 + 8 + 3);
    }

    #[test]
    fn score_is_capped_at_one_hundred() {
        let list = findings(&[Severity::Critical; 5]);
        assert_eq!(web_risk_score(&list), 100);
    }

    #[test]
    fn score_ignores_finding_order() {
        let mut list = findings(&[Severity::Low, Severity::Critical, Severity::Medium]);
        let before = web_risk_score(&list);
        list.reverse();
        assert_eq!(web_risk_score(&list), before);
    }

    #[test]
    fn dns_bonuses_reduce_and_floor_at_zero() {
        let all = SecurityFeatureSet {
            dnssec_enabled: true,
            spf_configured: true,
            dkim_configured: true,
            dmarc_configured: true,
            caa_configured: true,
        };
        let list = findings(&[Severity::High, Severity::Medium]);
        assert_eq!(dns_risk_score(&list, &all), 23 - 15);
        assert_eq!(dns_risk_score(&findings(&[Severity::Low]), &all), 0);
    }

    #[test]
    fn dns_bonus_applies_after_the_cap() {
        let spf_only = SecurityFeatureSet { spf_configured: true, ..Default::default() };
        let list = findings(&[Severity::Critical; 6]);
        assert_eq!(dns_risk_score(&list, &spf_only), 97);
    }
}
