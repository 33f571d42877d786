use std::collections::{BTreeMap, VecDeque};

use inspector_proto::{ErrorPayload, Event, HighlightBox, SerializedNode};
use serde::Serialize;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnimationRecord {
    pub op: String,
    pub success: bool,
}

/// Editor-side view of the surface, built only from agent events.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EditorState {
    pub highlight: Option<HighlightBox>,
    pub selected: Option<String>,
    pub dom_tree: Option<SerializedNode>,
    /// Last status reported per selector.
    pub animations: BTreeMap<String, AnimationRecord>,
    pub errors: VecDeque<ErrorPayload>,
    pub agent_ready_at: Option<u64>,
}

impl EditorState {
    /// Drops everything that only held for the previous surface load.
    pub fn clear_surface(&mut self) {
        self.highlight = None;
        self.dom_tree = None;
        self.agent_ready_at = None;
    }

    pub fn apply(&mut self, event: Event, error_history: usize) {
        if let Some((op, status)) = event.as_animation_status() {
            self.animations.insert(
                status.selector.clone(),
                AnimationRecord {
                    op: op.as_str().to_string(),
                    success: status.success,
                },
            );
            return;
        }
        match event {
            Event::Highlight(highlight) => self.highlight = Some(highlight),
            Event::Selected(payload) => {
                debug!(target = "host.events", selector = %payload.selector, "element selected");
                self.selected = Some(payload.selector);
            }
            Event::DomTree(tree) => self.dom_tree = Some(tree),
            Event::InitAck(ack) if ack.ready => self.agent_ready_at = Some(ack.timestamp),
            Event::InitAck(_) => {}
            Event::Error(error) => {
                warn!(
                    target = "host.events",
                    message = %error.message,
                    selector = ?error.selector,
                    "surface reported an error"
                );
                // The address no longer resolves; the user has to pick again.
                if error.selector.is_some() && error.selector == self.selected {
                    self.selected = None;
                }
                self.errors.push_back(error);
                while self.errors.len() > error_history.max(1) {
                    self.errors.pop_front();
                }
            }
            Event::HandshakeAck => {}
            Event::Applied(_)
            | Event::Removed(_)
            | Event::Paused(_)
            | Event::Resumed(_)
            | Event::Restarted(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inspector_proto::{AnimationOp, AnimationStatus, InitAckPayload, SelectorPayload};

    fn selected(selector: &str) -> Event {
        Event::Selected(SelectorPayload {
            selector: selector.into(),
        })
    }

    #[test]
    fn latest_highlight_and_selection_win() {
        let mut state = EditorState::default();
        for top in [1.0, 2.0, 3.0] {
            state.apply(
                Event::Highlight(HighlightBox {
                    top,
                    left: 0.0,
                    width: 1.0,
                    height: 1.0,
                }),
                8,
            );
        }
        state.apply(selected("#a"), 8);
        state.apply(selected("#b"), 8);
        assert_eq!(state.highlight.map(|h| h.top), Some(3.0));
        assert_eq!(state.selected.as_deref(), Some("#b"));
    }

    #[test]
    fn error_for_selection_clears_it() {
        let mut state = EditorState::default();
        state.apply(selected("#box"), 8);
        state.apply(Event::error("Element not found: #other", Some("#other".into())), 8);
        assert_eq!(state.selected.as_deref(), Some("#box"));
        state.apply(Event::error("Element not found: #box", Some("#box".into())), 8);
        assert_eq!(state.selected, None);
        assert_eq!(state.errors.len(), 2);
    }

    #[test]
    fn error_history_is_bounded() {
        let mut state = EditorState::default();
        for n in 0..5 {
            state.apply(Event::error(format!("failure {n}"), None), 3);
        }
        let messages: Vec<&str> = state.errors.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, ["failure 2", "failure 3", "failure 4"]);
    }

    #[test]
    fn animation_status_is_recorded_per_selector() {
        let mut state = EditorState::default();
        let status = |success| AnimationStatus {
            selector: "#box".into(),
            success,
        };
        state.apply(Event::animation_status(AnimationOp::Apply, status(true)), 8);
        state.apply(Event::animation_status(AnimationOp::Pause, status(true)), 8);
        assert_eq!(
            state.animations.get("#box"),
            Some(&AnimationRecord {
                op: "pause".into(),
                success: true
            })
        );
        state.apply(
            Event::InitAck(InitAckPayload {
                ready: true,
                timestamp: 42,
            }),
            8,
        );
        assert_eq!(state.agent_ready_at, Some(42));
        state.clear_surface();
        assert_eq!(state.agent_ready_at, None);
        assert_eq!(state.animations.len(), 1);
    }
}
