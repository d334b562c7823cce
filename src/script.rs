//! Script assembly: per-article dialogues → one episode script.
//!
//! Transition narration depends only on an article's position in the
//! running order, never on its content.

use std::fmt;

use crate::dialogue::DialogueScript;
use crate::source::Article;

pub const OPENING_LINE: &str = "Welcome back to your daily news update!";
pub const NEXT_DISCUSSION_LINE: &str = "Moving on to our next discussion.";
pub const FINAL_STORY_LINE: &str = "Now to our final story.";
pub const SIGN_OFF_LINE: &str =
    "Thank you for tuning in! We'll be back with more news coverage for you tomorrow!";

/// The whole episode script. Only ever grows by appending.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssembledScript {
    text: String,
}

impl AssembledScript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_section(&mut self, transition: &str, dialogue: &str) {
        self.text.push('\n');
        self.text.push_str(transition);
        self.text.push('\n');
        self.text.push_str(dialogue);
    }

    pub fn push_sign_off(&mut self) {
        self.text.push_str("\n\n");
        self.text.push_str(SIGN_OFF_LINE);
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for AssembledScript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Transition spoken before the article at `position` out of `len`.
///
/// A single-article episode gets the opening line: the closing transition
/// only applies when there is more than one article.
pub fn transition_for(position: usize, len: usize) -> &'static str {
    if position == 0 {
        OPENING_LINE
    } else if position + 1 == len {
        FINAL_STORY_LINE
    } else {
        NEXT_DISCUSSION_LINE
    }
}

/// Stitch dialogues together in article order and append the sign-off.
pub fn assemble(sections: &[(Article, DialogueScript)]) -> AssembledScript {
    let mut script = AssembledScript::new();
    for (position, (_article, dialogue)) in sections.iter().enumerate() {
        script.push_section(transition_for(position, sections.len()), dialogue);
    }
    script.push_sign_off();
    script
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(title: &str, dialogue: &str) -> (Article, DialogueScript) {
        (
            Article::new(title, format!("{title} - desc{title}")),
            dialogue.to_string(),
        )
    }

    fn transitions(script: &AssembledScript) -> Vec<&str> {
        script
            .as_str()
            .lines()
            .filter(|l| [OPENING_LINE, NEXT_DISCUSSION_LINE, FINAL_STORY_LINE].contains(l))
            .collect()
    }

    #[test]
    fn three_articles_get_opening_next_and_final() {
        let script = assemble(&[
            section("A", "Alice: about A"),
            section("B", "Bob: about B"),
            section("C", "Alice: about C"),
        ]);
        let expected = format!(
            "\n{OPENING_LINE}\nAlice: about A\n{NEXT_DISCUSSION_LINE}\nBob: about B\n{FINAL_STORY_LINE}\nAlice: about C\n\n{SIGN_OFF_LINE}"
        );
        assert_eq!(script.as_str(), expected);
    }

    #[test]
    fn transitions_precede_their_dialogue() {
        let script = assemble(&[
            section("A", "Alice: about A"),
            section("B", "Bob: about B"),
            section("C", "Alice: about C"),
        ]);
        let text = script.as_str();
        let opening = text.find(OPENING_LINE).unwrap();
        let a = text.find("about A").unwrap();
        let next = text.find(NEXT_DISCUSSION_LINE).unwrap();
        let b = text.find("about B").unwrap();
        let last = text.find(FINAL_STORY_LINE).unwrap();
        let c = text.find("about C").unwrap();
        let sign_off = text.find(SIGN_OFF_LINE).unwrap();
        assert!(opening < a && a < next && next < b && b < last && last < c && c < sign_off);
        assert!(text.ends_with(SIGN_OFF_LINE));
    }

    #[test]
    fn empty_list_is_sign_off_only() {
        let script = assemble(&[]);
        assert_eq!(script.as_str(), format!("\n\n{SIGN_OFF_LINE}"));
        assert!(transitions(&script).is_empty());
    }

    #[test]
    fn single_article_uses_opening_line() {
        let script = assemble(&[section("A", "Alice: only story")]);
        assert_eq!(transitions(&script), vec![OPENING_LINE]);
    }

    #[test]
    fn two_articles_open_then_close() {
        let script = assemble(&[section("A", "Alice: a"), section("B", "Bob: b")]);
        assert_eq!(transitions(&script), vec![OPENING_LINE, FINAL_STORY_LINE]);
    }

    #[test]
    fn first_is_opening_and_last_is_final_for_any_length() {
        for len in 2..8 {
            let sections: Vec<_> = (0..len)
                .map(|i| section(&format!("T{i}"), &format!("Bob: story {i}")))
                .collect();
            let script = assemble(&sections);
            let found = transitions(&script);
            assert_eq!(found.len(), len);
            assert_eq!(found.first(), Some(&OPENING_LINE));
            assert_eq!(found.last(), Some(&FINAL_STORY_LINE));
            assert!(found[1..len - 1].iter().all(|t| *t == NEXT_DISCUSSION_LINE));
        }
    }

    #[test]
    fn transition_for_positions() {
        assert_eq!(transition_for(0, 1), OPENING_LINE);
        assert_eq!(transition_for(0, 5), OPENING_LINE);
        assert_eq!(transition_for(2, 5), NEXT_DISCUSSION_LINE);
        assert_eq!(transition_for(4, 5), FINAL_STORY_LINE);
    }
}
