//! Perspective definitions and the two built-in vocabularies.
//!
//! A perspective is one named camera viewpoint with a fixed pair of artifacts:
//! the seed image the synthesizer starts from and the synthesized image the
//! trainer consumes. The set is fixed for the lifetime of a run.

use serde::{Deserialize, Serialize};

/// One named camera viewpoint. Identity is the label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PerspectiveSpec {
    /// Human-readable viewpoint name (e.g. "Back Left Top")
    pub label: String,
    /// Text spliced into the synthesis prompt
    pub prompt_term: String,
    /// Seed image file name under the init directory
    pub input_artifact: String,
    /// Synthesized image file name, also the trainer's view name
    pub output_artifact: String,
}

impl PerspectiveSpec {
    /// Create a perspective whose prompt term is its label.
    pub fn new(
        label: impl Into<String>,
        output_artifact: impl Into<String>,
        input_artifact: impl Into<String>,
    ) -> Self {
        let label = label.into();
        Self {
            prompt_term: label.clone(),
            label,
            input_artifact: input_artifact.into(),
            output_artifact: output_artifact.into(),
        }
    }

    /// Override the prompt term.
    pub fn with_prompt_term(mut self, term: impl Into<String>) -> Self {
        self.prompt_term = term.into();
        self
    }

    /// File name of the trainer's render for this perspective.
    pub fn render_artifact(&self) -> String {
        format!("output_{}", self.output_artifact)
    }
}

/// Which prompt vocabulary the synthesis model was fine-tuned on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vocabulary {
    /// Prompts use plain-text viewpoint labels
    Plain,
    /// Prompts use `<token>` viewpoint markers
    #[default]
    Tokenized,
}

impl Vocabulary {
    /// Pick the vocabulary from the `--not-tokenized` CLI flag.
    pub fn from_not_tokenized(not_tokenized: bool) -> Self {
        if not_tokenized {
            Vocabulary::Plain
        } else {
            Vocabulary::Tokenized
        }
    }

    /// Default model identifier for this vocabulary.
    pub fn default_model(&self) -> &'static str {
        match self {
            Vocabulary::Plain => "AdrianoC/RubberDuckProspectStableDiffusion_1_5",
            Vocabulary::Tokenized => "AdrianoC/RubberDuckProspectStableDiffusion_1_5_tokens",
        }
    }

    /// The full, ordered perspective set.
    pub fn perspectives(&self) -> Vec<PerspectiveSpec> {
        VIEWPOINTS
            .iter()
            .map(|v| {
                let spec = PerspectiveSpec::new(v.label, v.output, v.input);
                match self {
                    Vocabulary::Plain => spec,
                    Vocabulary::Tokenized => spec.with_prompt_term(v.token),
                }
            })
            .collect()
    }
}

struct Viewpoint {
    label: &'static str,
    token: &'static str,
    output: &'static str,
    input: &'static str,
}

// Tokens follow the model's training captions, which mirror left and right.
const VIEWPOINTS: [Viewpoint; 17] = [
    Viewpoint { label: "Top", token: "<top>", output: "top_camera.png", input: "init_top.png" },
    Viewpoint { label: "Right Top", token: "<left_top>", output: "right_top.png", input: "init_right_top.png" },
    Viewpoint { label: "Back Right Top", token: "<back_left_top>", output: "back_right_top.png", input: "init_back_right_top.png" },
    Viewpoint { label: "Back Top", token: "<back_top>", output: "back_top.png", input: "init_back_top.png" },
    Viewpoint { label: "Back Left Top", token: "<back_right_top>", output: "back_left_top.png", input: "init_back_left_top.png" },
    Viewpoint { label: "Left Top", token: "<right_top>", output: "left_top.png", input: "init_left_top.png" },
    Viewpoint { label: "Front Left Top", token: "<front_right_top>", output: "front_left_top.png", input: "init_front_left_top.png" },
    Viewpoint { label: "Front Top", token: "<front_top>", output: "front_top.png", input: "init_front_top.png" },
    Viewpoint { label: "Front Right Top", token: "<front_left_top>", output: "front_right_top.png", input: "init_front_right_top.png" },
    Viewpoint { label: "Right", token: "<left>", output: "right.png", input: "init_right.png" },
    Viewpoint { label: "Back Right", token: "<back_left>", output: "back_right.png", input: "init_back_right.png" },
    Viewpoint { label: "Back", token: "<back>", output: "back.png", input: "init_back.png" },
    Viewpoint { label: "Back Left", token: "<back_right>", output: "back_left.png", input: "init_back_left.png" },
    Viewpoint { label: "Left", token: "<right>", output: "left.png", input: "init_left.png" },
    Viewpoint { label: "Front Left", token: "<front_right>", output: "front_left.png", input: "init_front_left.png" },
    Viewpoint { label: "Front", token: "<front>", output: "front.png", input: "init_front.png" },
    Viewpoint { label: "Front Right", token: "<front_left>", output: "front_right.png", input: "init_front_right.png" },
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_both_vocabularies_have_seventeen_viewpoints() {
        assert_eq!(Vocabulary::Plain.perspectives().len(), 17);
        assert_eq!(Vocabulary::Tokenized.perspectives().len(), 17);
    }

    #[test]
    fn test_labels_are_unique() {
        let labels: HashSet<_> = Vocabulary::Plain
            .perspectives()
            .into_iter()
            .map(|p| p.label)
            .collect();
        assert_eq!(labels.len(), 17);
    }

    #[test]
    fn test_plain_prompt_term_is_label() {
        for p in Vocabulary::Plain.perspectives() {
            assert_eq!(p.prompt_term, p.label);
        }
    }

    #[test]
    fn test_tokenized_prompt_terms() {
        let perspectives = Vocabulary::Tokenized.perspectives();
        let right_top = perspectives.iter().find(|p| p.label == "Right Top").unwrap();
        assert_eq!(right_top.prompt_term, "<left_top>");
        assert_eq!(right_top.output_artifact, "right_top.png");
        assert!(perspectives.iter().all(|p| p.prompt_term.starts_with('<')));
    }

    #[test]
    fn test_render_artifact_name() {
        let p = PerspectiveSpec::new("Top", "top_camera.png", "init_top.png");
        assert_eq!(p.render_artifact(), "output_top_camera.png");
    }

    #[test]
    fn test_vocabulary_from_flag() {
        assert_eq!(Vocabulary::from_not_tokenized(true), Vocabulary::Plain);
        assert_eq!(Vocabulary::from_not_tokenized(false), Vocabulary::Tokenized);
        assert!(Vocabulary::Tokenized.default_model().ends_with("_tokens"));
    }

    #[test]
    fn test_vocabulary_serde() {
        let v: Vocabulary = serde_yaml::from_str("plain").unwrap();
        assert_eq!(v, Vocabulary::Plain);
    }
}
