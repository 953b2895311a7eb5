//! Post-processing of free-text document analyses

use std::sync::LazyLock;

use regex::Regex;

use super::types::StructuredData;

static DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{1,2}/\d{1,2}/\d{4}").expect("static regex is valid"));

static AMOUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+[,.]?\d*\s*€").expect("static regex is valid"));

static REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:n°|ref|référence)\s*:?\s*[A-Z0-9-]+").expect("static regex is valid")
});

const SUMMARY_LINES: usize = 3;
const SUMMARY_FALLBACK_CHARS: usize = 200;

/// Suggestions offered when the analysis contains none
pub const DEFAULT_SUGGESTIONS: [&str; 3] = [
    "Vérifiez les dates d'échéance",
    "Préparez les documents complémentaires",
    "Contactez les services concernés si besoin",
];

/// First three non-blank lines, joined
pub fn extract_summary(analysis: &str) -> String {
    let summary = analysis
        .lines()
        .filter(|line| !line.trim().is_empty())
        .take(SUMMARY_LINES)
        .collect::<Vec<_>>()
        .join(" ");
    let summary = summary.trim();

    if summary.is_empty() {
        let head: String = analysis.chars().take(SUMMARY_FALLBACK_CHARS).collect();
        format!("{head}...")
    } else {
        summary.to_string()
    }
}

/// Dates, euro amounts and references, in order of appearance
pub fn extract_structured_data(analysis: &str) -> StructuredData {
    let all = |re: &Regex| -> Vec<String> {
        re.find_iter(analysis).map(|m| m.as_str().to_string()).collect()
    };

    StructuredData {
        dates: all(&DATE),
        amounts: all(&AMOUNT),
        references: all(&REFERENCE),
    }
}

/// Lines that read like advice or bullet points
pub fn extract_suggestions(analysis: &str) -> Vec<String> {
    let suggestions: Vec<String> = analysis
        .lines()
        .filter(|line| {
            line.contains("suggestion")
                || line.contains("action")
                || line.contains("recommand")
                || line.starts_with("- ")
        })
        .map(|line| line.strip_prefix("- ").unwrap_or(line).trim().to_string())
        .filter(|line| !line.is_empty())
        .collect();

    if suggestions.is_empty() {
        DEFAULT_SUGGESTIONS.iter().map(ToString::to_string).collect()
    } else {
        suggestions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const ANALYSIS: &str = "Notification de la MDPH du 12/03/2024.\n\
        \n\
        Référence : MDPH-2024-0042, montant AEEH 151,80 € par mois.\n\
        Renouvellement attendu avant le 1/9/2025.\n\
        - Préparer le certificat médical\n\
        Nous recommandons de contacter l'école.\n";

    #[test]
    fn test_summary_takes_three_non_blank_lines() {
        assert_eq!(
            extract_summary(ANALYSIS),
            "Notification de la MDPH du 12/03/2024. \
             Référence : MDPH-2024-0042, montant AEEH 151,80 € par mois. \
             Renouvellement attendu avant le 1/9/2025."
        );
        assert_eq!(extract_summary("Une seule ligne"), "Une seule ligne");
    }

    #[test]
    fn test_summary_of_blank_text() {
        assert_eq!(extract_summary("   \n\n"), "   \n\n...");
        assert_eq!(extract_summary(""), "...");
    }

    #[test]
    fn test_structured_data() {
        let data = extract_structured_data(ANALYSIS);
        assert_eq!(data.dates, vec!["12/03/2024", "1/9/2025"]);
        assert_eq!(data.amounts, vec!["151,80 €"]);
        assert_eq!(data.references, vec!["Référence : MDPH-2024-0042"]);
        assert!(!data.is_empty());

        let none = extract_structured_data("rien à signaler");
        assert!(none.is_empty());
    }

    #[test]
    fn test_references_case_insensitive() {
        let data = extract_structured_data("dossier n° 7781-B et REF: ab12");
        assert_eq!(data.references, vec!["n° 7781-B", "REF: ab12"]);
    }

    #[test]
    fn test_suggestions() {
        assert_eq!(
            extract_suggestions(ANALYSIS),
            vec![
                "Préparer le certificat médical".to_string(),
                "Nous recommandons de contacter l'école.".to_string(),
            ]
        );
    }

    #[test]
    fn test_suggestions_default_list() {
        assert_eq!(extract_suggestions("Texte neutre."), DEFAULT_SUGGESTIONS.to_vec());
    }
}
