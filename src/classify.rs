//! Structural classification of `MonoBehaviour`s.
//!
//! The script class of a `MonoBehaviour` is often unrecoverable (missing `MonoScript`,
//! stripped names), so objects are recognized by which fields they have.
//! Every rule is a row in a table so the precedence between them stays visible.

use std::cmp::Reverse;

use serde_derive::Serialize;
use serde_json::Value;

use crate::fields::{self, FONT_DATA_HINT_KEYS, FONT_DATA_KEYS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Kind {
    Font,
    FontData,
}

/// What a rule gets to look at.
#[derive(Debug, Clone, Copy)]
pub struct Signals<'a> {
    pub tree: &'a Value,
    /// Declared script class, if the `MonoScript` could be resolved.
    pub script_class: Option<&'a str>,
}

impl<'a> Signals<'a> {
    pub fn new(tree: &'a Value, script_class: Option<&'a str>) -> Self {
        Signals { tree, script_class }
    }

    fn script_short_name(&self) -> Option<&'a str> {
        let class = self.script_class?;
        class.rsplit('.').next()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Rule {
    pub name: &'static str,
    pub kind: Kind,
    pub priority: u8,
    pub matches: fn(&Signals<'_>) -> bool,
}

pub const BUILTIN_RULES: &[Rule] = &[
    Rule {
        name: "chars",
        kind: Kind::FontData,
        priority: 100,
        matches: |s| fields::has_key(s.tree, "chars"),
    },
    Rule {
        name: "script:tk2dFontData",
        kind: Kind::FontData,
        priority: 90,
        matches: |s| s.script_short_name() == Some("tk2dFontData"),
    },
    Rule {
        name: "script:tk2dFont",
        kind: Kind::Font,
        priority: 90,
        matches: |s| s.script_short_name() == Some("tk2dFont"),
    },
    Rule {
        name: "font-data-pointer",
        kind: Kind::Font,
        priority: 50,
        matches: |s| fields::has_any(s.tree, FONT_DATA_KEYS),
    },
    Rule {
        name: "font-data-hints",
        kind: Kind::FontData,
        priority: 10,
        matches: |s| {
            fields::has_any(s.tree, FONT_DATA_HINT_KEYS) && !fields::has_key(s.tree, "m_Script")
        },
    },
];

/// Which kind wins when rules of both kinds match the same object.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TieBreak {
    /// `chars` together with a font data pointer means `FontData`.
    #[default]
    PreferFontData,
    PreferFont,
}
impl TieBreak {
    fn preferred(self) -> Kind {
        match self {
            TieBreak::PreferFontData => Kind::FontData,
            TieBreak::PreferFont => Kind::Font,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub kind: Kind,
    /// Name of the rule that decided the classification.
    pub rule: &'static str,
}

#[derive(Debug, Clone)]
pub struct Classifier {
    rules: Vec<Rule>,
    tie_break: TieBreak,
}

impl Default for Classifier {
    fn default() -> Self {
        Classifier::new(TieBreak::default())
    }
}

impl Classifier {
    pub fn new(tie_break: TieBreak) -> Self {
        Classifier::with_rules(BUILTIN_RULES.to_vec(), tie_break)
    }

    pub fn with_rules(rules: Vec<Rule>, tie_break: TieBreak) -> Self {
        Classifier { rules, tie_break }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn tie_break(&self) -> TieBreak {
        self.tie_break
    }

    /// Picks the matching rule of the preferred kind with the highest priority.
    /// Earlier rules win between equal priorities.
    pub fn classify(&self, signals: &Signals<'_>) -> Option<Classification> {
        let preferred = self.tie_break.preferred();
        self.rules
            .iter()
            .enumerate()
            .filter(|(_, rule)| (rule.matches)(signals))
            .max_by_key(|&(i, rule)| (rule.kind == preferred, rule.priority, Reverse(i)))
            .map(|(_, rule)| Classification {
                kind: rule.kind,
                rule: rule.name,
            })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn classify(tree: Value) -> Option<Classification> {
        Classifier::default().classify(&Signals::new(&tree, None))
    }

    #[test]
    fn chars_means_font_data() {
        let result = classify(json!({ "m_Script": {}, "chars": [] })).unwrap();
        assert_eq!(result.kind, Kind::FontData);
        assert_eq!(result.rule, "chars");
    }

    #[test]
    fn font_data_pointer_means_font() {
        let tree = json!({
            "m_Script": { "m_FileID": 0, "m_PathID": 1 },
            "data": { "m_FileID": 0, "m_PathID": 2 },
        });
        let result = classify(tree).unwrap();
        assert_eq!(result.kind, Kind::Font);
        assert_eq!(result.rule, "font-data-pointer");
    }

    #[test]
    fn font_data_wins_when_both_match() {
        let tree = json!({ "chars": [1, 2], "fontData": { "m_FileID": 0, "m_PathID": 9 } });
        assert_eq!(classify(tree).unwrap().kind, Kind::FontData);

        // the weak signal still beats the font pointer
        let tree = json!({ "lineHeight": 3.0, "data": { "m_FileID": 0, "m_PathID": 9 } });
        let result = classify(tree).unwrap();
        assert_eq!(result.kind, Kind::FontData);
        assert_eq!(result.rule, "font-data-hints");
    }

    #[test]
    fn tie_break_can_be_flipped() {
        let tree = json!({ "chars": [1, 2], "fontData": { "m_FileID": 0, "m_PathID": 9 } });
        let classifier = Classifier::new(TieBreak::PreferFont);
        let result = classifier.classify(&Signals::new(&tree, None)).unwrap();
        assert_eq!(result.kind, Kind::Font);
    }

    #[test]
    fn weak_hints_need_missing_script() {
        assert_eq!(classify(json!({ "m_Script": {}, "lineHeight": 12.0 })), None);
        assert_eq!(
            classify(json!({ "useDictionary": 1 })).map(|c| c.kind),
            Some(Kind::FontData)
        );
    }

    #[test]
    fn declared_script_name() {
        let tree = json!({ "m_Script": {} });
        let classifier = Classifier::default();
        let font = classifier
            .classify(&Signals::new(&tree, Some("tk2d.tk2dFont")))
            .unwrap();
        assert_eq!(font.kind, Kind::Font);
        assert_eq!(font.rule, "script:tk2dFont");

        let data = classifier
            .classify(&Signals::new(&tree, Some("tk2dFontData")))
            .unwrap();
        assert_eq!(data.kind, Kind::FontData);
        assert_eq!(classifier.classify(&Signals::new(&tree, Some("tk2dSprite"))), None);
    }

    #[test]
    fn unrelated_objects_are_ignored() {
        assert_eq!(classify(json!({ "m_Script": {}, "m_Name": "Camera" })), None);
        assert_eq!(classify(json!(null)), None);
    }
}
