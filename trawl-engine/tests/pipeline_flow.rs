//! End-to-end pipeline scenarios driven through the public engine API

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use trawl_core::catalog::Catalog;
use trawl_core::domain::event::PipelineEvent;
use trawl_core::domain::pipeline::{PipelineId, PipelineStatus, StepStatus};
use trawl_core::domain::target::Target;
use trawl_core::domain::template::CustomStep;
use trawl_engine::session::RecordingSession;
use trawl_engine::{Engine, EngineConfig};

const PROMPT: &str = "\x1b[32muser@host\x1b[0m:~$ ";

struct Scenario {
    engine: Engine,
    session: Arc<RecordingSession>,
    events: UnboundedReceiver<PipelineEvent>,
    clock: DateTime<Utc>,
}

impl Scenario {
    fn new() -> Self {
        let session = Arc::new(RecordingSession::new());
        let (tx, events) = mpsc::unbounded_channel();
        let engine = Engine::new(
            EngineConfig::default(),
            Catalog::builtin(),
            session.clone(),
            tx,
        );
        Self {
            engine,
            session,
            events,
            clock: Utc::now(),
        }
    }

    fn tick(&mut self, ms: i64) -> DateTime<Utc> {
        self.clock += Duration::milliseconds(ms);
        self.clock
    }

    fn launch(&mut self, template: &str, target: &str, custom: Option<&[CustomStep]>) -> PipelineId {
        let now = self.clock;
        let id = self
            .engine
            .create_pipeline(template, target, custom, now)
            .unwrap();
        self.engine.bind_channel(id, "term-1").unwrap();
        self.engine.start(id, now).unwrap();
        id
    }

    /// Terminal echo, then output lines, then the prompt
    fn shell_replies(&mut self, lines: &[&str]) {
        let command = self.session.commands().last().cloned().unwrap_or_default();

        let now = self.tick(5);
        self.engine.on_data("term-1", &format!("{}\r\n", command), now);

        let mut body = String::new();
        for line in lines {
            body.push_str(line);
            body.push_str("\r\n");
        }
        body.push_str(PROMPT);
        let now = self.tick(700);
        self.engine.on_data("term-1", &body, now);

        if lines.is_empty() {
            // A bare prompt only completes after the idle fallback
            let now = self.tick(1500);
            self.engine.on_tick(now);
        }
    }

    fn check_fanout_invariant(&self, id: PipelineId) {
        let pipeline = self.engine.get(id).unwrap();
        for step in &pipeline.steps {
            assert!(step.fanout.is_consistent(), "step '{}'", step.name());
            assert!(step.fanout.active <= 1);
        }
        assert!(pipeline.running_steps() <= 1);
    }
}

#[test]
fn test_domain_subdomains_feed_probe_step() {
    let mut s = Scenario::new();
    let id = s.launch("domain", "example.com", None);
    assert_eq!(s.session.commands(), vec!["subfinder -d 'example.com' -silent"]);

    s.shell_replies(&["a.example.com", "b.example.com"]);

    let pipeline = s.engine.get(id).unwrap();
    assert_eq!(
        pipeline.steps[0].targets,
        vec![Target::from("a.example.com"), Target::from("b.example.com")]
    );
    assert_eq!(pipeline.steps[0].status, StepStatus::Completed);
    assert_eq!(pipeline.current_step, Some(1));
    assert_eq!(
        s.session.commands()[1],
        "printf '%s\\n' 'a.example.com' 'b.example.com' | httpx -silent"
    );
}

#[test]
fn test_domain_runs_to_completion_with_fanout() {
    let mut s = Scenario::new();
    let id = s.launch("domain", "example.com", None);

    s.shell_replies(&["a.example.com", "b.example.com"]);
    s.shell_replies(&[
        "https://a.example.com [200]",
        "https://b.example.com:8443 [403]",
    ]);

    // Port scan fans out over the bare hosts
    assert_eq!(
        s.session.commands()[2],
        "nmap -sV -T4 --top-ports 100 'a.example.com'"
    );
    s.check_fanout_invariant(id);
    s.shell_replies(&[
        "Nmap scan report for a.example.com (93.184.216.34)",
        "22/tcp  open  ssh     OpenSSH 8.9",
        "443/tcp open  https   nginx",
    ]);
    s.check_fanout_invariant(id);

    assert_eq!(
        s.session.commands()[3],
        "nmap -sV -T4 --top-ports 100 'b.example.com'"
    );
    s.shell_replies(&[
        "Nmap scan report for b.example.com",
        "8443/tcp open  https-alt",
    ]);

    let pipeline = s.engine.get(id).unwrap();
    assert_eq!(pipeline.steps[2].status, StepStatus::Completed);
    assert_eq!(pipeline.steps[2].fanout.completed, 2);
    assert_eq!(pipeline.steps[2].targets.len(), 3);

    // Only the HTTP ports reach the vulnerability scan
    assert_eq!(
        s.session.commands()[4],
        "nuclei -u 'a.example.com':'443' -silent"
    );
    s.shell_replies(&["[tech-detect] nginx"]);
    assert_eq!(
        s.session.commands()[5],
        "nuclei -u 'b.example.com':'8443' -silent"
    );
    s.shell_replies(&[]);

    let pipeline = s.engine.get(id).unwrap();
    assert_eq!(pipeline.status, PipelineStatus::Completed);
    assert_eq!(pipeline.steps[3].status, StepStatus::Completed);
    assert_eq!(pipeline.steps[3].fanout.total, 2);
    assert_eq!(s.session.commands().len(), 6);
    assert_eq!(s.engine.active_count(), 0);
}

#[test]
fn test_empty_input_skips_step() {
    let mut s = Scenario::new();
    let id = s.launch("domain", "example.com", None);

    s.shell_replies(&["a.example.com"]);
    s.shell_replies(&["https://a.example.com"]);
    s.shell_replies(&["Nmap scan report for a.example.com", "22/tcp open ssh"]);

    let pipeline = s.engine.get(id).unwrap();
    assert_eq!(pipeline.steps[3].status, StepStatus::Skipped);
    assert_eq!(pipeline.status, PipelineStatus::Completed);
    assert_eq!(s.session.commands().len(), 3);
}

#[test]
fn test_cancel_during_fanout() {
    let mut s = Scenario::new();
    let id = s.launch("domain", "example.com", None);

    s.shell_replies(&["a.example.com", "b.example.com"]);
    s.shell_replies(&["https://a.example.com", "https://b.example.com"]);
    s.check_fanout_invariant(id);

    let now = s.tick(100);
    assert!(s.engine.cancel(id, now).unwrap());
    s.check_fanout_invariant(id);

    s.shell_replies(&["Nmap scan report for a.example.com", "80/tcp open http"]);
    let pipeline = s.engine.get(id).unwrap();
    assert_eq!(pipeline.status, PipelineStatus::Cancelled);
    assert_eq!(pipeline.steps[2].status, StepStatus::Cancelled);
    assert!(pipeline.steps[2].targets.is_empty());
    assert_eq!(s.session.commands().len(), 3);
    assert_eq!(s.session.interrupts(), 1);
}

/// Runs the domain template up to its first port-scan fan-out item
fn scenario_in_port_scan() -> (Scenario, PipelineId) {
    let mut s = Scenario::new();
    let id = s.launch("domain", "example.com", None);
    s.shell_replies(&["a.example.com", "b.example.com"]);
    s.shell_replies(&["https://a.example.com", "https://b.example.com"]);

    let pipeline = s.engine.get(id).unwrap();
    assert_eq!(pipeline.current_step, Some(2));
    assert_eq!(pipeline.steps[2].fanout.total, 2);
    assert_eq!(pipeline.steps[2].fanout.active, 1);
    s.check_fanout_invariant(id);
    (s, id)
}

#[test]
fn test_pause_during_fanout_then_resume() {
    let (mut s, id) = scenario_in_port_scan();

    assert!(s.engine.pause(id).unwrap());
    s.check_fanout_invariant(id);

    // The item in flight still lands, but the next one waits
    s.shell_replies(&["Nmap scan report for a.example.com", "443/tcp open https"]);
    s.check_fanout_invariant(id);
    let pipeline = s.engine.get(id).unwrap();
    assert_eq!(pipeline.status, PipelineStatus::Paused);
    assert_eq!(pipeline.steps[2].status, StepStatus::Running);
    assert_eq!(pipeline.steps[2].fanout.completed, 1);
    assert_eq!(pipeline.steps[2].fanout.active, 0);
    assert_eq!(pipeline.steps[2].fanout.queue.len(), 1);
    assert_eq!(pipeline.steps[2].targets.len(), 1);
    assert_eq!(s.session.commands().len(), 3);
    assert!(!s.engine.has_command_in_flight(id));

    let now = s.tick(50);
    assert!(s.engine.resume(id, now).unwrap());
    s.check_fanout_invariant(id);
    assert_eq!(
        s.session.commands()[3],
        "nmap -sV -T4 --top-ports 100 'b.example.com'"
    );

    s.shell_replies(&["Nmap scan report for b.example.com", "80/tcp open http"]);
    s.check_fanout_invariant(id);
    let pipeline = s.engine.get(id).unwrap();
    assert_eq!(pipeline.status, PipelineStatus::Running);
    assert_eq!(pipeline.steps[2].status, StepStatus::Completed);
    assert_eq!(pipeline.steps[2].fanout.completed, 2);
    assert_eq!(pipeline.steps[2].targets.len(), 2);
    assert_eq!(pipeline.current_step, Some(3));
    assert_eq!(
        s.session.commands()[4],
        "nuclei -u 'a.example.com':'443' -silent"
    );
}

#[test]
fn test_skip_during_fanout_drops_queued_items() {
    let (mut s, id) = scenario_in_port_scan();

    let now = s.tick(100);
    assert!(s.engine.skip(id, now).unwrap());
    s.check_fanout_invariant(id);
    assert_eq!(s.session.interrupts(), 1);

    let pipeline = s.engine.get(id).unwrap();
    let scan = &pipeline.steps[2];
    assert_eq!(scan.status, StepStatus::Skipped);
    assert!(scan.fanout.is_drained());
    assert!(scan.fanout.queue.is_empty());
    assert_eq!(scan.fanout.completed, 0);

    // No port records, so the vulnerability scan takes the probed URLs
    assert_eq!(pipeline.current_step, Some(3));
    assert_eq!(pipeline.steps[3].status, StepStatus::Running);
    assert_eq!(pipeline.steps[3].fanout.total, 2);
    assert!(s.session.commands()[3].starts_with("nuclei -u 'https://a.example.com'"));
    assert!(
        !s.session
            .commands()
            .iter()
            .any(|c| c.starts_with("nmap") && c.contains("b.example.com"))
    );

    s.shell_replies(&["[info] a"]);
    s.check_fanout_invariant(id);
    s.shell_replies(&["[info] b"]);
    s.check_fanout_invariant(id);

    let pipeline = s.engine.get(id).unwrap();
    assert_eq!(pipeline.status, PipelineStatus::Completed);
    assert_eq!(pipeline.steps[2].status, StepStatus::Skipped);
    assert_eq!(pipeline.steps[3].fanout.completed, 2);
}

#[test]
fn test_channel_lost_during_fanout() {
    let (mut s, id) = scenario_in_port_scan();

    let now = s.tick(100);
    s.engine.on_channel_closed("term-1", now);
    s.check_fanout_invariant(id);

    let pipeline = s.engine.get(id).unwrap();
    assert_eq!(pipeline.status, PipelineStatus::Paused);
    assert_eq!(pipeline.channel, None);
    assert_eq!(pipeline.steps[2].status, StepStatus::Error);
    assert!(pipeline.steps[2].fanout.is_drained());
    assert!(!s.engine.has_command_in_flight(id));

    // Output on the dead channel goes nowhere
    let now = s.tick(700);
    s.engine
        .on_data("term-1", "Nmap scan report for a.example.com\n", now);
    s.check_fanout_invariant(id);
    assert_eq!(s.session.commands().len(), 3);

    s.engine.bind_channel(id, "term-2").unwrap();
    let now = s.tick(10);
    assert!(s.engine.resume(id, now).unwrap());
    s.check_fanout_invariant(id);

    let pipeline = s.engine.get(id).unwrap();
    assert_eq!(pipeline.status, PipelineStatus::Running);
    assert_eq!(pipeline.current_step, Some(3));
    assert_eq!(pipeline.channel.as_deref(), Some("term-2"));
    assert_eq!(s.session.commands().len(), 4);
    assert!(s.session.commands()[3].starts_with("nuclei -u "));
}

#[test]
fn test_custom_pipeline_with_hostile_output() {
    let mut s = Scenario::new();
    let steps = vec![
        CustomStep {
            name: "list".to_string(),
            command: "cat {target}".to_string(),
            parser: "line".to_string(),
            fanout: false,
        },
        CustomStep {
            name: "fetch".to_string(),
            command: "curl -s {target}".to_string(),
            parser: "no-such-parser".to_string(),
            fanout: true,
        },
    ];
    let id = s.launch("custom", "hosts.txt", Some(steps.as_slice()));

    s.shell_replies(&["safe.example.com", "evil.com; rm -rf ~"]);
    let commands = s.session.commands();
    assert_eq!(commands[1], "curl -s 'safe.example.com'");

    s.shell_replies(&["ok"]);
    assert_eq!(s.session.commands()[2], "curl -s 'evil.com; rm -rf ~'");
    s.shell_replies(&["ok"]);

    assert_eq!(
        s.engine.get(id).unwrap().status,
        PipelineStatus::Completed
    );
}

#[test]
fn test_events_follow_transitions() {
    let mut s = Scenario::new();
    let id = s.launch("webapp", "https://app.example.com", None);
    let now = s.tick(10);
    s.engine.cancel(id, now).unwrap();

    let mut events = Vec::new();
    while let Ok(event) = s.events.try_recv() {
        events.push(event);
    }

    assert_eq!(events[0], PipelineEvent::Created { id });
    assert!(events.contains(&PipelineEvent::StatusChanged {
        id,
        status: PipelineStatus::Running
    }));
    assert!(events.iter().any(|e| matches!(
        e,
        PipelineEvent::CommandDispatched { step: 0, .. }
    )));
    assert!(events.contains(&PipelineEvent::StatusChanged {
        id,
        status: PipelineStatus::Cancelled
    }));
    assert_eq!(
        events.last(),
        Some(&PipelineEvent::ActiveCount { count: 0 })
    );
}
