//! Boundary with the page's animation library.
//!
//! The library loads asynchronously inside the surface, so handlers reach it
//! through [`LibraryGate`], which resolves once an engine is installed.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use inspector_proto::AnimationParams;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::dom::{Document, NodeId};
use crate::AgentError;

/// Tween controls that configure playback rather than name a style.
const TWEEN_CONTROLS: &[&str] = &[
    "duration",
    "delay",
    "ease",
    "repeat",
    "repeatDelay",
    "yoyo",
    "stagger",
    "paused",
    "overwrite",
    "immediateRender",
];

/// Contract of the animation library as seen by the agent.
pub trait AnimationEngine: Send + Sync {
    fn to(&self, doc: &mut Document, node: NodeId, params: &AnimationParams) -> Result<(), String>;
    fn set(&self, doc: &mut Document, node: NodeId, properties: &AnimationParams) -> Result<(), String>;
    fn kill_tweens_of(&self, doc: &mut Document, node: NodeId) -> Result<(), String>;
    fn pause_tweens_of(&self, doc: &mut Document, node: NodeId) -> Result<(), String>;
    fn resume_tweens_of(&self, doc: &mut Document, node: NodeId) -> Result<(), String>;
    fn restart_tweens_of(&self, doc: &mut Document, node: NodeId) -> Result<(), String>;
}

/// Load signal for the animation library.
#[derive(Clone)]
pub struct LibraryGate {
    tx: Arc<watch::Sender<Option<Arc<dyn AnimationEngine>>>>,
}

impl Default for LibraryGate {
    fn default() -> Self {
        Self::new()
    }
}

impl LibraryGate {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    pub fn with_engine(engine: Arc<dyn AnimationEngine>) -> Self {
        let gate = Self::new();
        gate.install(engine);
        gate
    }

    /// Marks the library loaded and wakes every waiting handler.
    pub fn install(&self, engine: Arc<dyn AnimationEngine>) {
        self.tx.send_replace(Some(engine));
    }

    pub fn current(&self) -> Option<Arc<dyn AnimationEngine>> {
        self.tx.borrow().clone()
    }

    /// Waits for the library, up to `bound` when one is given.
    pub async fn ready(&self, bound: Option<Duration>) -> Result<Arc<dyn AnimationEngine>, AgentError> {
        self.ready_since(Instant::now(), bound).await
    }

    /// Like [`ready`](Self::ready), with `bound` counted from `since`.
    pub async fn ready_since(
        &self,
        since: Instant,
        bound: Option<Duration>,
    ) -> Result<Arc<dyn AnimationEngine>, AgentError> {
        if let Some(engine) = self.current() {
            return Ok(engine);
        }
        let mut rx = self.tx.subscribe();
        let wait = async move {
            rx.wait_for(Option::is_some)
                .await
                .ok()
                .and_then(|engine| engine.clone())
        };
        let engine = match bound {
            Some(bound) => tokio::time::timeout_at(since + bound, wait).await.ok().flatten(),
            None => wait.await,
        };
        engine.ok_or(AgentError::DependencyUnavailable {
            waited_ms: bound.map(|b| b.as_millis() as u64).unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TweenState {
    Playing,
    Paused,
}

#[derive(Debug, Clone)]
struct Tween {
    properties: AnimationParams,
    state: TweenState,
    restarts: u32,
}

/// Transform components written by `set`, kept so later calls merge.
#[derive(Debug, Clone, Copy)]
struct TransformParts {
    x: f64,
    y: f64,
    rotation: f64,
    scale: f64,
}

impl Default for TransformParts {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            rotation: 0.0,
            scale: 1.0,
        }
    }
}

impl TransformParts {
    fn to_css(self) -> String {
        format!(
            "translate({}px, {}px) rotate({}deg) scale({})",
            self.x, self.y, self.rotation, self.scale
        )
    }
}

/// In-memory engine: jumps every tween to its end values and tracks
/// playback state per node.
#[derive(Default)]
pub struct TweenRegistry {
    tweens: Mutex<HashMap<NodeId, Vec<Tween>>>,
    transforms: Mutex<HashMap<NodeId, TransformParts>>,
}

impl TweenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tween_count(&self, node: NodeId) -> usize {
        self.tweens.lock().get(&node).map(Vec::len).unwrap_or(0)
    }

    pub fn states(&self, node: NodeId) -> Vec<TweenState> {
        self.tweens
            .lock()
            .get(&node)
            .map(|tweens| tweens.iter().map(|t| t.state).collect())
            .unwrap_or_default()
    }

    pub fn restarts(&self, node: NodeId) -> u32 {
        self.tweens
            .lock()
            .get(&node)
            .map(|tweens| tweens.iter().map(|t| t.restarts).sum())
            .unwrap_or(0)
    }

    fn set_state(&self, node: NodeId, state: TweenState) {
        if let Some(tweens) = self.tweens.lock().get_mut(&node) {
            for tween in tweens {
                tween.state = state;
            }
        }
    }
}

impl AnimationEngine for TweenRegistry {
    fn to(&self, doc: &mut Document, node: NodeId, params: &AnimationParams) -> Result<(), String> {
        let properties: AnimationParams = params
            .iter()
            .filter(|(key, _)| !TWEEN_CONTROLS.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        self.set(doc, node, &properties)?;
        let state = match params.get("paused") {
            Some(Value::Bool(true)) => TweenState::Paused,
            _ => TweenState::Playing,
        };
        self.tweens.lock().entry(node).or_default().push(Tween {
            properties,
            state,
            restarts: 0,
        });
        Ok(())
    }

    fn set(&self, doc: &mut Document, node: NodeId, properties: &AnimationParams) -> Result<(), String> {
        let mut transforms = self.transforms.lock();
        let mut parts = transforms.get(&node).copied().unwrap_or_default();
        let mut transform_touched = false;
        for (key, value) in properties {
            match key.as_str() {
                "x" | "y" | "rotation" | "scale" => {
                    let number = numeric(value).ok_or_else(|| format!("{key} must be numeric"))?;
                    match key.as_str() {
                        "x" => parts.x = number,
                        "y" => parts.y = number,
                        "rotation" => parts.rotation = number,
                        _ => parts.scale = number,
                    }
                    transform_touched = true;
                }
                _ => {
                    let css = scalar(value).ok_or_else(|| format!("{key} must be a string or number"))?;
                    doc.set_style_property(node, &kebab_case(key), css);
                }
            }
        }
        if transform_touched {
            doc.set_style_property(node, "transform", parts.to_css());
            transforms.insert(node, parts);
        }
        Ok(())
    }

    fn kill_tweens_of(&self, _doc: &mut Document, node: NodeId) -> Result<(), String> {
        self.tweens.lock().remove(&node);
        Ok(())
    }

    fn pause_tweens_of(&self, _doc: &mut Document, node: NodeId) -> Result<(), String> {
        self.set_state(node, TweenState::Paused);
        Ok(())
    }

    fn resume_tweens_of(&self, _doc: &mut Document, node: NodeId) -> Result<(), String> {
        self.set_state(node, TweenState::Playing);
        Ok(())
    }

    fn restart_tweens_of(&self, doc: &mut Document, node: NodeId) -> Result<(), String> {
        let replay: Vec<AnimationParams> = {
            let mut tweens = self.tweens.lock();
            let Some(tweens) = tweens.get_mut(&node) else {
                return Ok(());
            };
            tweens
                .iter_mut()
                .map(|tween| {
                    tween.state = TweenState::Playing;
                    tween.restarts += 1;
                    tween.properties.clone()
                })
                .collect()
        };
        for properties in &replay {
            self.set(doc, node, properties)?;
        }
        Ok(())
    }
}

fn numeric(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let trimmed = s.trim();
            let trimmed = trimmed
                .strip_suffix("px")
                .or_else(|| trimmed.strip_suffix("deg"))
                .unwrap_or(trimmed);
            trimmed.parse().ok()
        }
        _ => None,
    };
    number.filter(|n| n.is_finite())
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn kebab_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for c in key.chars() {
        if c.is_ascii_uppercase() {
            out.push('-');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use kurbo::Size;
    use serde_json::json;

    fn params(value: Value) -> AnimationParams {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    fn doc_with_box() -> (Document, NodeId) {
        let mut doc = Document::new(Size::new(200.0, 200.0));
        let body = doc.body();
        let node = doc.append_element(body, "div").id("box").build();
        (doc, node)
    }

    #[test]
    fn set_maps_shorthand_properties() {
        let (mut doc, node) = doc_with_box();
        let engine = TweenRegistry::new();
        engine
            .set(&mut doc, node, &params(json!({"x": 100, "backgroundColor": "red", "opacity": 0.5})))
            .unwrap();
        assert_eq!(
            doc.style_property(node, "transform"),
            Some("translate(100px, 0px) rotate(0deg) scale(1)")
        );
        assert_eq!(doc.style_property(node, "background-color"), Some("red"));
        assert_eq!(doc.style_property(node, "opacity"), Some("0.5"));

        engine.set(&mut doc, node, &params(json!({"rotation": "45deg"}))).unwrap();
        assert_eq!(
            doc.style_property(node, "transform"),
            Some("translate(100px, 0px) rotate(45deg) scale(1)")
        );
        assert!(engine.set(&mut doc, node, &params(json!({"x": [1, 2]}))).is_err());
    }

    #[test]
    fn tween_lifecycle_is_tracked_per_node() {
        let (mut doc, node) = doc_with_box();
        let engine = TweenRegistry::new();
        engine
            .to(&mut doc, node, &params(json!({"x": 100, "duration": 1})))
            .unwrap();
        assert_eq!(engine.tween_count(node), 1);
        assert_eq!(doc.style_property(node, "duration"), None);

        engine.pause_tweens_of(&mut doc, node).unwrap();
        assert_eq!(engine.states(node), vec![TweenState::Paused]);
        engine.restart_tweens_of(&mut doc, node).unwrap();
        assert_eq!(engine.states(node), vec![TweenState::Playing]);
        assert_eq!(engine.restarts(node), 1);

        engine.kill_tweens_of(&mut doc, node).unwrap();
        assert_eq!(engine.tween_count(node), 0);
        // Nothing left to act on is still fine.
        engine.kill_tweens_of(&mut doc, node).unwrap();
        engine.resume_tweens_of(&mut doc, node).unwrap();
    }

    #[tokio::test]
    async fn gate_resolves_immediately_once_installed() {
        let gate = LibraryGate::with_engine(Arc::new(TweenRegistry::new()));
        assert!(gate.ready(Some(Duration::from_millis(1))).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn gate_wakes_waiters_on_install() {
        let gate = LibraryGate::new();
        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.ready(None).await.is_ok() })
        };
        tokio::task::yield_now().await;
        gate.install(Arc::new(TweenRegistry::new()));
        assert!(waiter.await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn bounded_wait_reports_unavailable() {
        let gate = LibraryGate::new();
        let err = gate.ready(Some(Duration::from_secs(10))).await.err().unwrap();
        assert!(matches!(err, AgentError::DependencyUnavailable { waited_ms: 10_000 }));
    }

    #[tokio::test(start_paused = true)]
    async fn bound_counts_from_the_given_start() {
        let gate = LibraryGate::new();
        let since = Instant::now();
        tokio::time::sleep(Duration::from_secs(8)).await;
        let waiting = Instant::now();
        assert!(gate.ready_since(since, Some(Duration::from_secs(10))).await.is_err());
        assert!(waiting.elapsed() < Duration::from_secs(3));
    }
}
