//! Notification composition.
//!
//! Turns a classified diff (or, on the first run of a period, the whole
//! current set) into an ordered message. Pure: no I/O.

use std::collections::HashSet;

use crate::models::{DisruptionRecord, DisruptionSet, LineRegistry, MentionRegistry, NotifyConfig};
use crate::pipeline::diff::Classification;
use crate::utils::truncate_graphemes;

/// Kind of a message section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    /// Current disruption in a full-status broadcast
    Disruption,
    New,
    Updated,
    Resolved,
    /// Summary of lines whose disruption did not change
    StillAffected,
    /// Full-status broadcast with nothing to report
    AllGood,
}

impl SectionKind {
    pub fn marker(&self) -> Option<&'static str> {
        match self {
            Self::Disruption => None,
            Self::New => Some("🆕"),
            Self::Updated => Some("🔄"),
            Self::Resolved | Self::AllGood => Some("✅"),
            Self::StillAffected => Some("ℹ️"),
        }
    }

    pub fn label(&self) -> Option<&'static str> {
        match self {
            Self::New => Some("NEW DISRUPTION"),
            Self::Updated => Some("UPDATED"),
            Self::Resolved => Some("RESOLVED"),
            _ => None,
        }
    }
}

/// One colored block of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub kind: SectionKind,

    /// Line this section reports on; `None` for summary sections
    pub line_id: Option<String>,

    pub emoji: Option<String>,

    /// Line display name, or the summary heading
    pub heading: String,

    pub body: Option<String>,

    pub color: String,

    /// User ids to mention
    pub mentions: Vec<String>,
}

impl Section {
    /// Heading with marker, emoji and label, e.g. "🆕 :central: Central (NEW DISRUPTION)".
    pub fn headline(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        if let Some(marker) = self.kind.marker() {
            parts.push(marker.to_string());
        }
        if let Some(emoji) = &self.emoji {
            parts.push(emoji.clone());
        }
        parts.push(self.heading.clone());
        if let Some(label) = self.kind.label() {
            parts.push(format!("({label})"));
        }
        parts.join(" ")
    }
}

/// An ordered message: a title and its sections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub title: String,
    pub sections: Vec<Section>,
}

impl Message {
    /// Plain-text rendering for consoles and logs.
    pub fn to_plain_text(&self) -> String {
        let mut out = self.title.clone();
        for section in &self.sections {
            out.push_str("\n\n");
            out.push_str(&section.headline());
            if let Some(body) = &section.body {
                out.push('\n');
                out.push_str(body);
            }
            if !section.mentions.is_empty() {
                out.push('\n');
                out.push_str(
                    &section
                        .mentions
                        .iter()
                        .map(|u| format!("@{u}"))
                        .collect::<Vec<_>>()
                        .join(" "),
                );
            }
        }
        out
    }

    /// Line ids in section order.
    pub fn line_ids(&self) -> Vec<&str> {
        self.sections
            .iter()
            .filter_map(|s| s.line_id.as_deref())
            .collect()
    }
}

/// Builds messages from diffs using registry presentation data.
pub struct Composer<'a> {
    registry: &'a LineRegistry,
    mentions: Option<&'a MentionRegistry>,
    options: NotifyConfig,
}

impl<'a> Composer<'a> {
    pub fn new(registry: &'a LineRegistry) -> Self {
        Self {
            registry,
            mentions: None,
            options: NotifyConfig::default(),
        }
    }

    pub fn with_mentions(mut self, mentions: &'a MentionRegistry) -> Self {
        self.mentions = Some(mentions);
        self
    }

    pub fn with_options(mut self, options: NotifyConfig) -> Self {
        self.options = options;
        self
    }

    /// Diff broadcast: New, Updated, Resolved, then a Still-affected summary.
    pub fn compose(&self, classification: &Classification) -> Message {
        let mut seen = HashSet::new();
        let mut sections = Vec::new();

        let buckets = [
            (SectionKind::New, &classification.new),
            (SectionKind::Updated, &classification.updated),
            (SectionKind::Resolved, &classification.resolved),
        ];
        for (kind, records) in buckets {
            for record in records {
                if seen.insert(record.line_id.as_str()) {
                    sections.push(self.line_section(kind, record));
                }
            }
        }

        let still_affected: Vec<&DisruptionRecord> = classification
            .unchanged
            .iter()
            .filter(|r| seen.insert(r.line_id.as_str()))
            .collect();
        if !still_affected.is_empty() {
            sections.push(self.still_affected_section(&still_affected));
        }

        Message {
            title: format!("UPDATE: {} Disruptions", self.options.network_name),
            sections,
        }
    }

    /// Full-status broadcast of the current set.
    pub fn compose_full(&self, current: &DisruptionSet) -> Message {
        if current.is_empty() {
            return Message {
                title: format!("{} Status Update", self.options.network_name),
                sections: vec![Section {
                    kind: SectionKind::AllGood,
                    line_id: None,
                    emoji: None,
                    heading: "All lines are running with good service.".to_string(),
                    body: None,
                    color: self.options.resolved_color.clone(),
                    mentions: Vec::new(),
                }],
            };
        }

        let mut seen = HashSet::new();
        let sections = current
            .iter()
            .filter(|r| seen.insert(r.line_id.as_str()))
            .map(|r| self.line_section(SectionKind::Disruption, r))
            .collect();

        Message {
            title: format!("{} Disruptions", self.options.network_name),
            sections,
        }
    }

    fn line_section(&self, kind: SectionKind, record: &DisruptionRecord) -> Section {
        let line = self.registry.get(&record.line_id);
        let (body, color, mentions) = match kind {
            SectionKind::Resolved => (None, self.options.resolved_color.clone(), Vec::new()),
            _ => (
                Some(truncate_graphemes(
                    &record.details,
                    self.options.max_details_chars,
                )),
                line.and_then(|l| l.color.clone())
                    .unwrap_or_else(|| self.options.default_color.clone()),
                self.mentions
                    .map(|m| m.users_for(&record.line_id))
                    .unwrap_or_default(),
            ),
        };

        Section {
            kind,
            line_id: Some(record.line_id.clone()),
            emoji: line.and_then(|l| l.emoji.clone()),
            heading: self.display_name(record),
            body,
            color,
            mentions,
        }
    }

    fn still_affected_section(&self, records: &[&DisruptionRecord]) -> Section {
        let names = records
            .iter()
            .map(|r| {
                let name = self.display_name(r);
                match self.registry.get(&r.line_id).and_then(|l| l.emoji.as_deref()) {
                    Some(emoji) => format!("{emoji} {name}"),
                    None => name,
                }
            })
            .collect::<Vec<_>>()
            .join(", ");
        let noun = if records.len() == 1 { "line" } else { "lines" };

        Section {
            kind: SectionKind::StillAffected,
            line_id: None,
            emoji: None,
            heading: format!("Still affected ({} {noun}):", records.len()),
            body: Some(names),
            color: self.options.unchanged_color.clone(),
            mentions: Vec::new(),
        }
    }

    /// Registry name, then the record's own name, then the raw id.
    fn display_name(&self, record: &DisruptionRecord) -> String {
        self.registry
            .get(&record.line_id)
            .map(|l| l.name.clone())
            .filter(|n| !n.trim().is_empty())
            .or_else(|| Some(record.line_name.clone()).filter(|n| !n.trim().is_empty()))
            .unwrap_or_else(|| record.line_id.clone())
    }
}

/// Compose a diff broadcast with default options and no mentions.
pub fn compose(classification: &Classification, registry: &LineRegistry) -> Message {
    Composer::new(registry).compose(classification)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LineDescriptor;
    use crate::pipeline::diff::calculate_diff;

    fn registry() -> LineRegistry {
        LineRegistry::new(vec![
            LineDescriptor {
                id: "central".into(),
                name: "Central".into(),
                emoji: Some(":central:".into()),
                color: Some("#DC241F".into()),
            },
            LineDescriptor::new("victoria", "Victoria"),
            LineDescriptor::new("jubilee", "Jubilee"),
            LineDescriptor::new("dlr", "DLR"),
        ])
    }

    fn record(id: &str, details: &str) -> DisruptionRecord {
        DisruptionRecord::new(id, "", details)
    }

    #[test]
    fn test_sections_are_grouped_in_order() {
        let previous = DisruptionSet::new([
            record("victoria", "Minor delays"),
            record("jubilee", "A"),
            record("dlr", "Part closure"),
        ]);
        let current = DisruptionSet::new([
            record("dlr", "Part closure"),
            record("jubilee", "B"),
            record("central", "Severe delays"),
        ]);
        let diff = calculate_diff(&current, &previous);
        let message = compose(&diff.classification, &registry());

        let kinds: Vec<SectionKind> = message.sections.iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![
                SectionKind::New,
                SectionKind::Updated,
                SectionKind::Resolved,
                SectionKind::StillAffected
            ]
        );
        assert_eq!(message.line_ids(), vec!["central", "jubilee", "victoria"]);
        assert_eq!(message.title, "UPDATE: TfL Tube Disruptions");
    }

    #[test]
    fn test_still_affected_lists_names_only() {
        let classification = Classification {
            unchanged: vec![record("central", "long details"), record("dlr", "more")],
            ..Classification::default()
        };
        let message = compose(&classification, &registry());

        assert_eq!(message.sections.len(), 1);
        let summary = &message.sections[0];
        assert_eq!(summary.heading, "Still affected (2 lines):");
        assert_eq!(summary.body.as_deref(), Some(":central: Central, DLR"));
        assert_eq!(summary.color, "#ffc107");
    }

    #[test]
    fn test_resolved_has_no_details_or_mentions() {
        let mentions =
            MentionRegistry::from_json(r#"{"victoria": {"users": ["U1"]}}"#).unwrap();
        let classification = Classification {
            resolved: vec![record("victoria", "Minor delays")],
            ..Classification::default()
        };
        let message = Composer::new(&registry())
            .with_mentions(&mentions)
            .compose(&classification);

        let section = &message.sections[0];
        assert_eq!(section.body, None);
        assert!(section.mentions.is_empty());
        assert_eq!(section.color, "#28a745");
        assert_eq!(section.headline(), "✅ Victoria (RESOLVED)");
    }

    #[test]
    fn test_new_section_carries_presentation_and_mentions() {
        let mentions =
            MentionRegistry::from_json(r#"{"lines": {"central": {"users": ["U1", ""]}}}"#)
                .unwrap();
        let classification = Classification {
            new: vec![record("central", "Severe delays")],
            ..Classification::default()
        };
        let registry = registry();
        let message = Composer::new(&registry)
            .with_mentions(&mentions)
            .compose(&classification);

        let section = &message.sections[0];
        assert_eq!(section.headline(), "🆕 :central: Central (NEW DISRUPTION)");
        assert_eq!(section.body.as_deref(), Some("Severe delays"));
        assert_eq!(section.color, "#DC241F");
        assert_eq!(section.mentions, vec!["U1"]);
    }

    #[test]
    fn test_line_appears_once_across_sections() {
        // Inconsistent input: the same line in two buckets and twice in one.
        let classification = Classification {
            new: vec![record("central", "X"), record("central", "Y")],
            updated: vec![record("central", "Z")],
            unchanged: vec![record("central", "X"), record("dlr", "D")],
            ..Classification::default()
        };
        let message = compose(&classification, &registry());

        assert_eq!(message.line_ids(), vec!["central"]);
        assert_eq!(message.sections[0].body.as_deref(), Some("X"));
        assert_eq!(message.sections[1].heading, "Still affected (1 line):");
        assert_eq!(message.sections[1].body.as_deref(), Some("DLR"));
    }

    #[test]
    fn test_display_name_fallbacks() {
        let classification = Classification {
            new: vec![
                DisruptionRecord::new("tram", "London Trams", "Delays"),
                DisruptionRecord::new("cable-car", "", "Closed"),
            ],
            ..Classification::default()
        };
        let message = compose(&classification, &registry());

        assert_eq!(message.sections[0].heading, "London Trams");
        assert_eq!(message.sections[1].heading, "cable-car");
        assert_eq!(message.sections[1].color, "#CCCCCC");
    }

    #[test]
    fn test_full_broadcast_with_disruptions() {
        let current = DisruptionSet::new([record("central", "Severe delays"), record("dlr", "X")]);
        let message = Composer::new(&registry()).compose_full(&current);

        assert_eq!(message.title, "TfL Tube Disruptions");
        assert_eq!(message.line_ids(), vec!["central", "dlr"]);
        assert!(message.sections.iter().all(|s| s.kind == SectionKind::Disruption));
        assert_eq!(message.sections[0].headline(), ":central: Central");
    }

    #[test]
    fn test_full_broadcast_all_good() {
        let message = Composer::new(&registry()).compose_full(&DisruptionSet::default());

        assert_eq!(message.title, "TfL Tube Status Update");
        assert_eq!(message.sections.len(), 1);
        assert_eq!(message.sections[0].kind, SectionKind::AllGood);
    }

    #[test]
    fn test_long_details_are_truncated() {
        let options = NotifyConfig {
            max_details_chars: 10,
            ..NotifyConfig::default()
        };
        let current = DisruptionSet::new([record("central", "Severe delays due to a signal failure")]);
        let message = Composer::new(&registry())
            .with_options(options)
            .compose_full(&current);

        assert_eq!(message.sections[0].body.as_deref(), Some("Severe de…"));
    }

    #[test]
    fn test_plain_text_rendering() {
        let classification = Classification {
            updated: vec![record("jubilee", "Minor delays")],
            ..Classification::default()
        };
        let text = compose(&classification, &registry()).to_plain_text();
        assert_eq!(
            text,
            "UPDATE: TfL Tube Disruptions\n\n🔄 Jubilee (UPDATED)\nMinor delays"
        );
    }
}
