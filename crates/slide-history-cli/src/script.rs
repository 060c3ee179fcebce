/// JSON edit scripts replayed through a `HistoryManager`.
///
/// A script is an initial deck plus a list of steps tagged by `op`:
///
/// ```json
/// {
///   "initial_state": [{"id": "s1", "elements": []}],
///   "steps": [
///     {"op": "execute", "action": {"type": "element_add", "description": "Added title"},
///      "state": [{"id": "s1", "elements": [{"id": "t", "content": "Hi"}]}]},
///     {"op": "wait", "ms": 1500},
///     {"op": "undo"}
///   ]
/// }
/// ```
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use slide_history::{ActionKind, HistoryManager, ManualClock, Slide};

#[derive(Debug, Deserialize)]
pub struct Script {
    #[serde(default)]
    pub initial_state: Vec<Slide>,
    pub steps: Vec<Step>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    Execute {
        action: ScriptAction,
        state: Vec<Slide>,
    },
    Undo,
    Redo,
    StartGroup {
        #[serde(default)]
        description: String,
    },
    EndGroup,
    Clear,
    /// Advances the replay clock.
    Wait {
        ms: u64,
    },
}

/// Compact action form; id and timestamp are filled in at replay time.
///
/// Unknown keys are rejected so a typo doesn't silently drop metadata.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScriptAction {
    #[serde(rename = "type")]
    pub kind: ActionKind,
    pub description: String,
    #[serde(default)]
    pub slide_id: Option<String>,
    #[serde(default)]
    pub element_id: Option<String>,
    #[serde(default)]
    pub text_edit: bool,
    /// Free-form metadata copied into the action's `extra` map.
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

/// What a single step did to the history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Executed { history_size: usize },
    Applied,
    Refused,
    GroupStarted,
    GroupEnded { history_size: usize },
    Cleared,
    Waited(u64),
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Executed { history_size } => write!(f, "recorded ({history_size} entries)"),
            Self::Applied => f.write_str("applied"),
            Self::Refused => f.write_str("nothing to do"),
            Self::GroupStarted => f.write_str("group opened"),
            Self::GroupEnded { history_size } => {
                write!(f, "group closed ({history_size} entries)")
            }
            Self::Cleared => f.write_str("history cleared"),
            Self::Waited(ms) => write!(f, "waited {ms} ms"),
        }
    }
}

/// Reads and parses a script file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not a valid script.
pub fn load_script(path: &Path) -> Result<Script> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read script: {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse script: {}", path.display()))
}

/// Runs every step against `mgr`, returning one outcome per step.
pub fn replay(
    mgr: &mut HistoryManager<Slide>,
    clock: &ManualClock,
    steps: &[Step],
) -> Vec<Outcome> {
    steps.iter().map(|step| run_step(mgr, clock, step)).collect()
}

fn run_step(mgr: &mut HistoryManager<Slide>, clock: &ManualClock, step: &Step) -> Outcome {
    match step {
        Step::Execute { action, state } => {
            let mut built = mgr.action(action.kind, action.description.clone());
            if let Some(slide_id) = &action.slide_id {
                built = built.on_slide(slide_id.clone());
            }
            if let Some(element_id) = &action.element_id {
                built = built.on_element(element_id.clone());
            }
            if action.text_edit {
                built = built.text_edit(true);
            }
            for (key, value) in &action.extra {
                built = built.with_extra(key.clone(), value.clone());
            }
            mgr.execute_action(built, state);
            Outcome::Executed {
                history_size: mgr.history_size(),
            }
        }
        Step::Undo => match mgr.undo() {
            Some(_) => Outcome::Applied,
            None => Outcome::Refused,
        },
        Step::Redo => match mgr.redo() {
            Some(_) => Outcome::Applied,
            None => Outcome::Refused,
        },
        Step::StartGroup { description } => {
            mgr.start_group(description.clone());
            Outcome::GroupStarted
        }
        Step::EndGroup => {
            mgr.end_group();
            Outcome::GroupEnded {
                history_size: mgr.history_size(),
            }
        }
        Step::Clear => {
            mgr.clear_history();
            Outcome::Cleared
        }
        Step::Wait { ms } => {
            clock.advance(*ms);
            Outcome::Waited(*ms)
        }
    }
}

/// Short label for a step, used in the replay log.
pub fn step_label(step: &Step) -> String {
    match step {
        Step::Execute { action, .. } => format!("{} \"{}\"", action.kind, action.description),
        Step::Undo => "undo".to_string(),
        Step::Redo => "redo".to_string(),
        Step::StartGroup { description } => format!("start_group \"{description}\""),
        Step::EndGroup => "end_group".to_string(),
        Step::Clear => "clear".to_string(),
        Step::Wait { ms } => format!("wait {ms}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use slide_history::HistoryConfig;

    const TYPING: &str = r#"{
        "initial_state": [{"id": "s1", "elements": [{"id": "t", "content": ""}]}],
        "steps": [
            {"op": "execute",
             "action": {"type": "element_update", "description": "Typed", "slide_id": "s1",
                        "element_id": "t", "text_edit": true},
             "state": [{"id": "s1", "elements": [{"id": "t", "content": "H"}]}]},
            {"op": "wait", "ms": 200},
            {"op": "execute",
             "action": {"type": "element_update", "description": "Typed", "slide_id": "s1",
                        "element_id": "t", "text_edit": true},
             "state": [{"id": "s1", "elements": [{"id": "t", "content": "Hi"}]}]},
            {"op": "undo"},
            {"op": "undo"},
            {"op": "redo"}
        ]
    }"#;

    fn manager_for(script: &Script) -> (HistoryManager<Slide>, ManualClock) {
        let clock = ManualClock::new(1_000);
        let mgr = HistoryManager::new(
            "script".to_string(),
            &script.initial_state,
            HistoryConfig::default(),
            None,
        )
        .with_clock(Arc::new(clock.clone()));
        (mgr, clock)
    }

    #[test]
    fn test_parse_script() {
        let script: Script = serde_json::from_str(TYPING).unwrap();
        assert_eq!(script.initial_state.len(), 1);
        assert_eq!(script.steps.len(), 6);
        assert!(matches!(script.steps[1], Step::Wait { ms: 200 }));
        assert!(matches!(script.steps[3], Step::Undo));
    }

    #[test]
    fn test_replay_merges_typing() {
        let script: Script = serde_json::from_str(TYPING).unwrap();
        let (mut mgr, clock) = manager_for(&script);

        let outcomes = replay(&mut mgr, &clock, &script.steps);
        assert_eq!(
            outcomes,
            vec![
                Outcome::Executed { history_size: 1 },
                Outcome::Waited(200),
                Outcome::Executed { history_size: 1 },
                Outcome::Applied,
                Outcome::Refused,
                Outcome::Applied,
            ]
        );
        assert_eq!(mgr.current_state()[0].elements[0].content, "Hi");
    }

    #[test]
    fn test_replay_group() {
        let json = r#"{
            "initial_state": [{"id": "s1"}],
            "steps": [
                {"op": "start_group", "description": "Build slide"},
                {"op": "execute", "action": {"type": "element_add", "description": "Title"},
                 "state": [{"id": "s1", "elements": [{"id": "a"}]}]},
                {"op": "execute", "action": {"type": "element_add", "description": "Body"},
                 "state": [{"id": "s1", "elements": [{"id": "a"}, {"id": "b"}]}]},
                {"op": "end_group"}
            ]
        }"#;
        let script: Script = serde_json::from_str(json).unwrap();
        let (mut mgr, clock) = manager_for(&script);

        let outcomes = replay(&mut mgr, &clock, &script.steps);
        assert_eq!(outcomes[3], Outcome::GroupEnded { history_size: 1 });
        assert_eq!(
            mgr.current_action().map(|a| a.description.as_str()),
            Some("Build slide")
        );
    }

    #[test]
    fn test_unknown_op_is_rejected() {
        let json = r#"{"steps": [{"op": "rewind"}]}"#;
        assert!(serde_json::from_str::<Script>(json).is_err());
    }

    #[test]
    fn test_unknown_action_key_is_rejected() {
        let json = r#"{"steps": [{"op": "execute",
            "action": {"type": "element_add", "description": "Logo", "source": "logo.png"},
            "state": []}]}"#;
        assert!(serde_json::from_str::<Script>(json).is_err());
    }

    #[test]
    fn test_extra_metadata_reaches_history() {
        let json = r#"{
            "initial_state": [{"id": "s1"}],
            "steps": [
                {"op": "execute",
                 "action": {"type": "element_add", "description": "Logo",
                            "extra": {"source": "logo.png"}},
                 "state": [{"id": "s1", "elements": [{"id": "logo", "kind": "image"}]}]}
            ]
        }"#;
        let script: Script = serde_json::from_str(json).unwrap();
        let (mut mgr, clock) = manager_for(&script);
        replay(&mut mgr, &clock, &script.steps);

        let action = mgr.current_action().unwrap();
        assert_eq!(
            action.metadata.extra.get("source").map(String::as_str),
            Some("logo.png")
        );
    }

    #[test]
    fn test_load_script_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "[").unwrap();

        let err = load_script(&path).unwrap_err();
        assert!(err.to_string().contains("broken.json"));
    }

    #[test]
    fn test_step_labels() {
        let script: Script = serde_json::from_str(TYPING).unwrap();
        assert_eq!(step_label(&script.steps[0]), "element_update \"Typed\"");
        assert_eq!(step_label(&script.steps[1]), "wait 200");
    }
}
