//! Recorded instrumentation sessions and deterministic replay.
//!
//! A session file is JSON: a list of named streams, each a list of events. A
//! stream is one logical execution stream, so it maps to one thread when
//! replayed into an [`MtProfiler`].

use serde::{Deserialize, Serialize};

use std::path::{Path, PathBuf};

use crate::{MtProfiler, ProfilerError, ProfilerResult, StProfiler};

pub const SESSION_VERSION: u32 = 1;

#[derive(Debug, Clone)]
pub struct SessionPath {
    path: PathBuf,
}

impl SessionPath {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn as_path(&self) -> &Path {
        &self.path
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionFile {
    pub version: u32,
    pub name: String,
    pub streams: Vec<SessionStream>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStream {
    pub name: String,
    pub events: Vec<SessionEvent>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    Start {
        region: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        qualifier: Option<String>,
    },
    Finish {
        elapsed: u64,
    },
    Clear,
}

/// Balance problems found in one stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StreamCheck {
    pub stream: String,
    #[serde(rename = "unmatchedFinishes")]
    pub unmatched_finishes: usize,
    #[serde(rename = "openAtEnd")]
    pub open_at_end: usize,
    #[serde(rename = "clearsWhileOpen")]
    pub clears_while_open: usize,
}

impl StreamCheck {
    pub fn is_balanced(&self) -> bool {
        self.unmatched_finishes == 0 && self.open_at_end == 0 && self.clears_while_open == 0
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    pub name: String,
    pub streams: Vec<SessionStream>,
}

impl Session {
    pub fn load(path: &SessionPath) -> ProfilerResult<Self> {
        let bytes = std::fs::read(path.as_path())?;
        let file: SessionFile = serde_json::from_slice(&bytes)?;
        Self::from_file(file)
    }

    pub fn from_file(file: SessionFile) -> ProfilerResult<Self> {
        if file.version != SESSION_VERSION {
            return Err(ProfilerError::Session(format!(
                "unsupported session version {} (expected {SESSION_VERSION})",
                file.version
            )));
        }
        let mut seen = std::collections::BTreeSet::new();
        for stream in &file.streams {
            if !seen.insert(stream.name.as_str()) {
                return Err(ProfilerError::Session(format!(
                    "duplicate stream name {:?}",
                    stream.name
                )));
            }
        }
        Ok(Self {
            name: file.name,
            streams: file.streams,
        })
    }

    /// Per-stream balance report. Replaying an unbalanced stream is safe but
    /// its report structure is not meaningful.
    pub fn check(&self) -> Vec<StreamCheck> {
        self.streams
            .iter()
            .map(|stream| {
                let mut check = StreamCheck {
                    stream: stream.name.clone(),
                    unmatched_finishes: 0,
                    open_at_end: 0,
                    clears_while_open: 0,
                };
                let mut open = 0usize;
                for event in &stream.events {
                    match event {
                        SessionEvent::Start { .. } => open += 1,
                        SessionEvent::Finish { .. } if open == 0 => check.unmatched_finishes += 1,
                        SessionEvent::Finish { .. } => open -= 1,
                        SessionEvent::Clear => {
                            if open > 0 {
                                check.clears_while_open += 1;
                            }
                            open = 0;
                        }
                    }
                }
                check.open_at_end = open;
                check
            })
            .collect()
    }

    /// Fails with the first unbalanced stream.
    pub fn validate(&self) -> ProfilerResult<()> {
        match self.check().into_iter().find(|c| !c.is_balanced()) {
            Some(c) => Err(ProfilerError::Session(format!(
                "stream {:?} is unbalanced: {} unmatched finish(es), \
                 {} region(s) open at end, {} clear(s) with regions open",
                c.stream,
                c.unmatched_finishes,
                c.open_at_end,
                c.clears_while_open
            ))),
            None => Ok(()),
        }
    }

    pub fn event_count(&self) -> usize {
        self.streams.iter().map(|s| s.events.len()).sum()
    }

    pub fn example() -> SessionFile {
        let stream = |name: &str, outer: u64, inner: u64| SessionStream {
            name: name.to_string(),
            events: vec![
                SessionEvent::Start {
                    region: "Zone::Process".to_string(),
                    qualifier: None,
                },
                SessionEvent::Start {
                    region: "Entity::Move".to_string(),
                    qualifier: Some("npc".to_string()),
                },
                SessionEvent::Finish { elapsed: inner },
                SessionEvent::Finish { elapsed: outer },
            ],
        };
        SessionFile {
            version: SESSION_VERSION,
            name: "example".to_string(),
            streams: vec![stream("main", 1200, 800), stream("worker", 500, 100)],
        }
    }
}

fn apply_st(profiler: &mut StProfiler, event: &SessionEvent) {
    match event {
        SessionEvent::Start { region, qualifier } => {
            profiler.event_started(region, qualifier.as_deref())
        }
        SessionEvent::Finish { elapsed } => profiler.event_finished(*elapsed),
        SessionEvent::Clear => profiler.clear(),
    }
}

fn apply_mt(profiler: &MtProfiler, event: &SessionEvent) {
    match event {
        SessionEvent::Start { region, qualifier } => {
            profiler.event_started(region, qualifier.as_deref())
        }
        SessionEvent::Finish { elapsed } => profiler.event_finished(*elapsed),
        SessionEvent::Clear => profiler.clear(),
    }
}

/// Replays every stream, one after another, on a single logical stream.
pub fn replay_single(session: &Session, profiler: &mut StProfiler) {
    for stream in &session.streams {
        tracing::debug!(stream = %stream.name, events = stream.events.len(), "replaying stream");
        for event in &stream.events {
            apply_st(profiler, event);
        }
    }
}

/// Replays each stream on its own thread, named after the stream.
///
/// Threads run concurrently and are all joined before this returns. A stream
/// containing `clear` clears every thread's statistics, so its effect on the
/// other streams depends on scheduling.
pub fn replay_threaded(session: &Session, profiler: &MtProfiler) -> ProfilerResult<()> {
    std::thread::scope(|scope| -> ProfilerResult<()> {
        let mut handles = Vec::with_capacity(session.streams.len());
        for stream in &session.streams {
            let handle = std::thread::Builder::new()
                .name(stream.name.clone())
                .spawn_scoped(scope, move || {
                    for event in &stream.events {
                        apply_mt(profiler, event);
                    }
                })?;
            handles.push((stream.name.as_str(), handle));
        }
        for (name, handle) in handles {
            handle.join().map_err(|_| {
                ProfilerError::Session(format!("replay of stream {name:?} panicked"))
            })?;
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start(region: &str) -> SessionEvent {
        SessionEvent::Start {
            region: region.to_string(),
            qualifier: None,
        }
    }

    fn finish(elapsed: u64) -> SessionEvent {
        SessionEvent::Finish { elapsed }
    }

    fn session(streams: Vec<(&str, Vec<SessionEvent>)>) -> Session {
        Session::from_file(SessionFile {
            version: SESSION_VERSION,
            name: "t".to_string(),
            streams: streams
                .into_iter()
                .map(|(name, events)| SessionStream {
                    name: name.to_string(),
                    events,
                })
                .collect(),
        })
        .expect("session")
    }

    #[test]
    fn example_parses_and_is_balanced() {
        let bytes = serde_json::to_vec(&Session::example()).expect("json");
        let file: SessionFile = serde_json::from_slice(&bytes).expect("parse");
        let s = Session::from_file(file).expect("session");
        assert!(s.validate().is_ok());
        assert_eq!(s.event_count(), 8);
    }

    #[test]
    fn event_json_shape() {
        let json = serde_json::to_value(&start("A")).expect("json");
        assert_eq!(json, serde_json::json!({"type": "start", "region": "A"}));
        let parsed: SessionEvent =
            serde_json::from_value(serde_json::json!({"type": "finish", "elapsed": 3}))
                .expect("parse");
        assert_eq!(parsed, finish(3));
    }

    #[test]
    fn rejects_wrong_version_and_duplicate_streams() {
        let err = Session::from_file(SessionFile {
            version: 2,
            name: "v2".to_string(),
            streams: Vec::new(),
        })
        .expect_err("version");
        assert!(err.to_string().contains("unsupported session version 2"));

        let dup = SessionStream {
            name: "a".to_string(),
            events: Vec::new(),
        };
        let err = Session::from_file(SessionFile {
            version: SESSION_VERSION,
            name: "dup".to_string(),
            streams: vec![dup.clone(), dup],
        })
        .expect_err("duplicate");
        assert!(err.to_string().contains("duplicate stream name"));
    }

    #[test]
    fn check_reports_imbalance() {
        let s = session(vec![
            ("ok", vec![start("A"), finish(1)]),
            ("extra", vec![finish(1), start("A")]),
            ("cleared", vec![start("A"), SessionEvent::Clear]),
        ]);
        let checks = s.check();
        assert!(checks[0].is_balanced());
        assert_eq!(checks[1].unmatched_finishes, 1);
        assert_eq!(checks[1].open_at_end, 1);
        assert_eq!(checks[2].clears_while_open, 1);
        assert_eq!(checks[2].open_at_end, 0);
        let err = s.validate().expect_err("unbalanced");
        assert!(err.to_string().contains("\"extra\""));
    }

    #[test]
    fn single_replay_merges_streams() {
        let s = session(vec![
            ("one", vec![start("A"), finish(2)]),
            ("two", vec![start("A"), finish(3)]),
        ]);
        let mut p = StProfiler::new();
        replay_single(&s, &mut p);
        let a = p.tree().find(&["A"]).expect("A");
        assert_eq!((a.count(), a.time()), (2, 5));
    }

    #[test]
    fn threaded_replay_keeps_streams_apart() {
        let s = session(vec![
            ("one", vec![start("A"), start("B"), finish(1), finish(4)]),
            ("two", vec![start("C"), finish(7)]),
        ]);
        let p = MtProfiler::new();
        replay_threaded(&s, &p).expect("replay");
        let mut report = p.report(0);
        report.sort_by(|a, b| a.thread.cmp(&b.thread));
        assert_eq!(report.len(), 2);
        assert_eq!(report[0].thread, "one");
        assert_eq!(report[0].total, 4);
        assert_eq!(report[0].entries[0].name, "A");
        assert_eq!(report[0].entries[1].name, "B");
        assert_eq!(report[0].entries[1].depth, 1);
        assert_eq!(report[1].thread, "two");
        assert_eq!(report[1].total, 7);
        assert_eq!(report[1].entries.len(), 1);
        assert_eq!(report[1].entries[0].name, "C");
    }
}
