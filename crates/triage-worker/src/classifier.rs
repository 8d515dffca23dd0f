//! Keyword category classifier
//!
//! Categories are checked in a fixed order (Billing, Technical, Legal) and
//! the first pattern that matches wins. Text that matches nothing is routed
//! as Technical.

use std::sync::LazyLock;

use orchestrator::TicketCategory;
use regex::Regex;

static BILLING_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"\b(?:bill|invoice|payment|charge|refund|subscription|plan upgrade|plan downgrade)\b",
        r"\b(?:billing|overcharge|double charge|cancel subscription)\b",
    ])
});

static TECHNICAL_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"\b(?:bug|error|crash|login|api|integration|slow|timeout)\b",
        r"\b(?:broken|not working|doesn't work|failed|failure)\b",
        r"\b(?:technical|support|help|issue)\b",
    ])
});

static LEGAL_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"\b(?:legal|lawyer|attorney|compliance|gdpr|privacy|terms|contract)\b",
        r"\b(?:subpoena|litigation|dispute|liability)\b",
    ])
});

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(&format!("(?i){p}")).expect("category pattern should compile"))
        .collect()
}

/// Regex-based category router
#[derive(Debug, Default, Clone, Copy)]
pub struct CategoryClassifier;

impl CategoryClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Category for a ticket's subject and body
    pub fn classify(&self, subject: &str, body: &str) -> TicketCategory {
        let text = format!("{subject} {body}");
        let ordered: [(TicketCategory, &LazyLock<Vec<Regex>>); 3] = [
            (TicketCategory::Billing, &BILLING_PATTERNS),
            (TicketCategory::Technical, &TECHNICAL_PATTERNS),
            (TicketCategory::Legal, &LEGAL_PATTERNS),
        ];
        ordered
            .into_iter()
            .find(|(_, patterns)| patterns.iter().any(|re| re.is_match(&text)))
            .map(|(category, _)| category)
            .unwrap_or(TicketCategory::Technical)
    }
}
