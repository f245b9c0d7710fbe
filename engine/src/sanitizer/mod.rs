//! Persona Output Sanitizer
//!
//! Cleans raw persona output before it enters the transcript. Local models
//! tend to echo speaker labels, address themselves in the third person, and
//! open with formulaic filler; the pipeline here removes those artifacts
//! while leaving the substance of the turn alone.
//!
//! The pipeline is an ordered list of named rules, each a pure
//! string-to-string function:
//!
//! 1. [`strip_speaker_tag`] - leading `[Name]` / `Name:` echo of the
//!    persona's own label
//! 2. [`Sanitizer::strip_me_fragments`] - stray lowercase `me:`
//!    self-references at line starts or after punctuation
//! 3. [`collapse_self_references`] - the persona's own name as a standalone
//!    word becomes "I", its possessive becomes "my"
//! 4. [`Sanitizer::strip_leadins`] - clichéd lead-in sentences
//! 5. [`Sanitizer::strip_citations`] - numeric citation markers and a
//!    trailing "References:" section
//! 6. Leading whitespace trim
//!
//! Sanitized text is stable: running the pipeline again on its own output
//! changes nothing. If the rules eat the whole turn, the least-processed
//! stage that still has content is kept instead.

use regex::Regex;

/// Strip a leading speaker tag the model echoed back.
///
/// Matches the persona's own label at the start of the text, either
/// bracketed (`[Name]`, `[Name]:`) or bare with a colon (`Name:`), case
/// insensitively. Repeated tags are stripped until none remain.
///
/// # Example
///
/// ```
/// use colloquy_engine::sanitizer::strip_speaker_tag;
///
/// assert_eq!(strip_speaker_tag("Optimist", "[Optimist] It works."), "It works.");
/// assert_eq!(strip_speaker_tag("Optimist", "Optimist: It works."), "It works.");
/// ```
pub fn strip_speaker_tag(persona: &str, text: &str) -> String {
    let escaped = regex::escape(persona);
    let pattern = format!(r"(?i)^\s*(?:\[{esc}\]\s*:?|{esc}\s*:)\s*", esc = escaped);
    let Ok(re) = Regex::new(&pattern) else {
        return text.to_string();
    };

    let mut current = text.to_string();
    loop {
        let next = re.replace(&current, "").into_owned();
        if next == current {
            return next;
        }
        current = next;
    }
}

/// Collapse third-person self-references into the first person.
///
/// The persona's own name as a standalone word becomes "I"; the possessive
/// form becomes "my". Substrings of longer words are left alone.
///
/// # Example
///
/// ```
/// use colloquy_engine::sanitizer::collapse_self_references;
///
/// let out = collapse_self_references("Optimist", "Optimist thinks Optimist's plan holds.");
/// assert_eq!(out, "I thinks my plan holds.");
/// ```
pub fn collapse_self_references(persona: &str, text: &str) -> String {
    let escaped = regex::escape(persona);
    let possessive = Regex::new(&format!(r"(?i)\b{}['’]s\b", escaped));
    let standalone = Regex::new(&format!(r"(?i)\b{}\b", escaped));

    match (possessive, standalone) {
        (Ok(possessive), Ok(standalone)) => {
            let text = possessive.replace_all(text, "my");
            standalone.replace_all(&text, "I").into_owned()
        }
        _ => text.to_string(),
    }
}

/// Output sanitization pipeline for persona turns
pub struct Sanitizer {
    /// `me:` fragments at a line start
    me_line: Regex,

    /// `me:` fragments following punctuation
    me_inline: Regex,

    /// Formulaic lead-in sentences, stripped only at the start of the text
    leadins: Vec<Regex>,

    /// Numeric citation markers like `[3]`
    citation: Regex,

    /// Trailing `References:` section through end of text
    references: Regex,
}

impl Sanitizer {
    /// Create a sanitizer with the predefined rule patterns
    ///
    /// # Errors
    ///
    /// Returns an error if any pattern fails to compile (should never happen
    /// with the hardcoded patterns).
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            me_line: Regex::new(r"(?m)^[ \t]*(?:me:[ \t]*)+")?,
            me_inline: Regex::new(r"([,;:])[ \t]*(?:me:[ \t]*)+")?,
            leadins: vec![
                Regex::new(r"(?i)^\s*i['’]d like to respond to [^.!?\n]*[.!?]\s*")?,
                Regex::new(
                    r"(?i)^\s*i['’]m glad (?:that )?[^.!?\n]*?\b(?:mentioned|raised|brought up)\b[^.!?\n]*[.!?]\s*",
                )?,
                Regex::new(
                    r"(?i)^\s*that['’]s an? (?:great|good|interesting|excellent|fair) point(?:,? \w+)?[.!]\s*",
                )?,
            ],
            citation: Regex::new(r"[ \t]*\[\d+\]")?,
            references: Regex::new(r"(?ims)^[ \t]*references[ \t]*:.*\z")?,
        })
    }

    /// Run the full pipeline over one persona's raw output.
    ///
    /// Never returns an empty string for non-empty input: if the rules eat
    /// everything, the least-processed stage that still has content is
    /// returned instead.
    pub fn sanitize(&self, persona: &str, raw: &str) -> String {
        let stages = self.apply_rules(persona, raw);
        let finished = match stages.last() {
            Some(last) => last.trim_start().to_string(),
            None => String::new(),
        };

        if finished.is_empty() {
            let mut candidates = vec![raw.to_string()];
            candidates.extend(stages);
            for stage in candidates {
                let kept = stage.trim_start();
                if !kept.is_empty() {
                    tracing::warn!(
                        "sanitizer emptied output for {}, keeping an earlier stage",
                        persona
                    );
                    return kept.to_string();
                }
            }
            return finished;
        }

        // A later rule can expose text an earlier rule strips (citation
        // removal can leave a "me:" right after punctuation), so re-run
        // the pipeline until the text is stable. Every rule only removes
        // or shortens text, so this terminates.
        let mut current = finished;
        loop {
            let stages = self.apply_rules(persona, &current);
            let next = match stages.last() {
                Some(last) => last.trim_start().to_string(),
                None => String::new(),
            };
            if next.is_empty() || next == current {
                return current;
            }
            current = next;
        }
    }

    /// Rule 2: remove stray lowercase `me:` self-reference fragments.
    ///
    /// A fragment at a line start collapses to the line remainder; a
    /// fragment after punctuation collapses onto the punctuation.
    pub fn strip_me_fragments(&self, text: &str) -> String {
        let text = self.me_line.replace_all(text, "");
        self.me_inline.replace_all(&text, "$1 ").into_owned()
    }

    /// Rule 4: strip clichéd lead-in sentences from the start of the text.
    ///
    /// Stacked lead-ins are stripped until the text no longer opens with
    /// one.
    pub fn strip_leadins(&self, text: &str) -> String {
        let mut current = text.to_string();
        loop {
            let mut changed = false;
            for pattern in &self.leadins {
                let next = pattern.replace(&current, "").into_owned();
                if next != current {
                    current = next;
                    changed = true;
                }
            }
            if !changed {
                return current;
            }
        }
    }

    /// Rule 5: remove numeric citation markers and any trailing
    /// "References:" section.
    pub fn strip_citations(&self, text: &str) -> String {
        let mut current = text.to_string();
        loop {
            let next = self.citation.replace_all(&current, "").into_owned();
            let next = self.references.replace(&next, "").trim_end().to_string();
            if next == current {
                return next;
            }
            current = next;
        }
    }

    fn apply_rules(&self, persona: &str, text: &str) -> Vec<String> {
        let s1 = strip_speaker_tag(persona, text);
        let s2 = self.strip_me_fragments(&s1);
        let s3 = collapse_self_references(persona, &s2);
        let s4 = self.strip_leadins(&s3);
        let s5 = self.strip_citations(&s4);
        vec![s1, s2, s3, s4, s5]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sanitizer() -> Sanitizer {
        Sanitizer::new().unwrap()
    }

    #[test]
    fn test_strip_bracketed_speaker_tag() {
        assert_eq!(
            strip_speaker_tag("Optimist", "[Optimist] The plan works."),
            "The plan works."
        );
        assert_eq!(
            strip_speaker_tag("Optimist", "[Optimist]: The plan works."),
            "The plan works."
        );
    }

    #[test]
    fn test_strip_bare_speaker_tag_requires_colon() {
        assert_eq!(
            strip_speaker_tag("Optimist", "Optimist: The plan works."),
            "The plan works."
        );
        // A bare name without a colon is normal prose, not a tag.
        assert_eq!(
            strip_speaker_tag("Optimist", "Optimist agrees with that."),
            "Optimist agrees with that."
        );
    }

    #[test]
    fn test_strip_repeated_speaker_tags() {
        assert_eq!(
            strip_speaker_tag("Optimist", "Optimist: [Optimist] hello"),
            "hello"
        );
    }

    #[test]
    fn test_speaker_tag_case_insensitive() {
        assert_eq!(strip_speaker_tag("Optimist", "OPTIMIST: hello"), "hello");
    }

    #[test]
    fn test_other_personas_tag_is_kept() {
        assert_eq!(
            strip_speaker_tag("Optimist", "[Skeptic] hello"),
            "[Skeptic] hello"
        );
    }

    #[test]
    fn test_speaker_tag_with_regex_metacharacters() {
        assert_eq!(strip_speaker_tag("C++ Fan", "C++ Fan: yes"), "yes");
    }

    #[test]
    fn test_me_fragment_at_line_start() {
        let s = sanitizer();
        assert_eq!(s.strip_me_fragments("me: I think this works"), "I think this works");
    }

    #[test]
    fn test_me_fragment_after_punctuation() {
        let s = sanitizer();
        assert_eq!(
            s.strip_me_fragments("On balance, me: I think this works"),
            "On balance, I think this works"
        );
    }

    #[test]
    fn test_me_fragments_repeated() {
        let s = sanitizer();
        assert_eq!(s.strip_me_fragments("me: me: hello"), "hello");
    }

    #[test]
    fn test_me_fragment_is_lowercase_only() {
        let s = sanitizer();
        assert_eq!(s.strip_me_fragments("ME: hello"), "ME: hello");
    }

    #[test]
    fn test_me_mid_word_untouched() {
        let s = sanitizer();
        assert_eq!(s.strip_me_fragments("blame: assign it later"), "blame: assign it later");
    }

    #[test]
    fn test_collapse_standalone_name() {
        assert_eq!(
            collapse_self_references("Optimist", "Optimist thinks it works"),
            "I thinks it works"
        );
    }

    #[test]
    fn test_collapse_possessive_name() {
        assert_eq!(
            collapse_self_references("Optimist", "Optimist's view stands"),
            "my view stands"
        );
    }

    #[test]
    fn test_collapse_leaves_substrings_alone() {
        assert_eq!(
            collapse_self_references("Optimist", "Optimists disagree"),
            "Optimists disagree"
        );
    }

    #[test]
    fn test_strip_leadin_respond_to() {
        let s = sanitizer();
        assert_eq!(
            s.strip_leadins("I'd like to respond to Skeptic's point. The data is clear."),
            "The data is clear."
        );
    }

    #[test]
    fn test_strip_leadin_glad_mentioned() {
        let s = sanitizer();
        assert_eq!(
            s.strip_leadins("I'm glad Skeptic mentioned costs. They are falling."),
            "They are falling."
        );
    }

    #[test]
    fn test_strip_stacked_leadins() {
        let s = sanitizer();
        assert_eq!(
            s.strip_leadins(
                "That's a great point, Skeptic. I'm glad you raised it. Costs are falling."
            ),
            "Costs are falling."
        );
    }

    #[test]
    fn test_leadin_only_at_start() {
        let s = sanitizer();
        let text = "Costs are falling. I'm glad Skeptic mentioned costs.";
        assert_eq!(s.strip_leadins(text), text);
    }

    #[test]
    fn test_strip_citation_markers() {
        let s = sanitizer();
        assert_eq!(
            s.strip_citations("Costs fell 40% [1] over a decade [12]."),
            "Costs fell 40% over a decade."
        );
    }

    #[test]
    fn test_strip_references_section() {
        let s = sanitizer();
        assert_eq!(
            s.strip_citations("Costs fell.\n\nReferences:\n[1] Some report\n[2] Another"),
            "Costs fell."
        );
    }

    #[test]
    fn test_full_pipeline_echoed_label_and_me() {
        let s = sanitizer();
        let out = s.sanitize("Optimist", "Optimist: me: what if we considered X?");
        assert_eq!(out, "what if we considered X?");
        assert!(!out.to_lowercase().contains("me:"));
    }

    #[test]
    fn test_pipeline_is_idempotent() {
        let s = sanitizer();
        let inputs = [
            "[Optimist] me: the plan works. Optimist's view [1] is simple.",
            "I'd like to respond to that point. Optimist: costs fall.",
            "plain text, nothing to do",
            "x,[1] me: y",
        ];
        for input in inputs {
            let once = s.sanitize("Optimist", input);
            let twice = s.sanitize("Optimist", &once);
            assert_eq!(once, twice, "not stable for {:?}", input);
        }
    }

    #[test]
    fn test_citation_strip_cannot_expose_me_fragment() {
        let s = sanitizer();
        let out = s.sanitize("Optimist", "agreed,[1] me: costs fall");
        assert_eq!(out, "agreed, costs fall");
    }

    #[test]
    fn test_empty_result_falls_back_to_earlier_stage() {
        let s = sanitizer();
        // The whole turn is one lead-in cliché; dropping it would lose the
        // turn, so the raw text is kept.
        let raw = "I'd like to respond to Skeptic's point.";
        assert_eq!(s.sanitize("Optimist", raw), raw);
    }

    #[test]
    fn test_empty_input_stays_empty() {
        let s = sanitizer();
        assert_eq!(s.sanitize("Optimist", ""), "");
        assert_eq!(s.sanitize("Optimist", "   "), "");
    }

    #[test]
    fn test_leading_whitespace_trimmed() {
        let s = sanitizer();
        assert_eq!(s.sanitize("Optimist", "  \n hello"), "hello");
    }
}
