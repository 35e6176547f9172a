//! Literal placeholder substitution.

/// Placeholder tokens understood by the summary page template.
pub mod tokens {
    pub const WHY: &str = "[[WHY]]";
    pub const DATETIME: &str = "[[DATETIME]]";
    pub const TIMING: &str = "[[TIMING]]";
    pub const BAND: &str = "[[BAND]]";
    pub const AMPLIFIER_BIAS: &str = "[[AMPLIFIER_BIAS]]";
    pub const FULL_BAND_RESP: &str = "[[FULL_BAND_RESP]]";
    pub const FREQ_RESP_LIST: &str = "[[FREQ_RESP_LIST]]";
    pub const RES_DICT: &str = "[[RES_DICT]]";
    pub const ETA_PATH: &str = "[[ETA_PATH]]";
    pub const TRACKING_PATH: &str = "[[TRACKING_PATH]]";
}

/// Replace every occurrence of each token, one substitution after another.
///
/// A value that contains a later token is itself rewritten by that later pass.
pub fn substitute(content: &str, substitutions: &[(&str, String)]) -> String {
    substitutions
        .iter()
        .fold(content.to_owned(), |acc, (token, value)| {
            acc.replace(token, value)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_occurrence_is_replaced() {
        let page = "<h1>Band [[BAND]]</h1><p>band=[[BAND]]</p>";
        let out = substitute(page, &[(tokens::BAND, "3".into())]);
        assert_eq!(out, "<h1>Band 3</h1><p>band=3</p>");
        assert!(!out.contains(tokens::BAND));
    }

    #[test]
    fn unknown_tokens_are_left_alone() {
        let page = "[[WHY]] [[SOMETHING_ELSE]]";
        let out = substitute(page, &[(tokens::WHY, "cooldown".into())]);
        assert_eq!(out, "cooldown [[SOMETHING_ELSE]]");
    }

    #[test]
    fn later_tokens_inside_earlier_values_are_expanded() {
        let page = "[[WHY]]";
        let out = substitute(
            page,
            &[
                (tokens::WHY, "see band [[BAND]]".into()),
                (tokens::BAND, "2".into()),
            ],
        );
        assert_eq!(out, "see band 2");
    }
}
