//! Tests for the session multiplexer, driven by in-memory event sources

use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use perlinject_core::channel::spawn_reader;
use perlinject_core::error::{InjectError, InjectResult};
use perlinject_core::escalation::{EscalationPrompter, PromptCancel, PromptOutcome, SignalSender};
use perlinject_core::events::{event_channel, DebuggerStream, EventSender, SessionEvent};
use perlinject_core::multiplexer::{Multiplexer, Outcome, SessionReport};
use perlinject_core::signals::SignalCatalog;
use perlinject_core::types::ProcessId;
use perlinject_core::watch::spawn_stream_watcher;
use perlinject_protocol::{Frame, Sentinel};

const TARGET: ProcessId = ProcessId(4242);
const SHORT: Duration = Duration::from_millis(50);
const LONG: Duration = Duration::from_secs(30);

/// Answers prompts from a script, then aborts.
struct ScriptedPrompter
{
    answers: VecDeque<PromptOutcome>,
}

impl ScriptedPrompter
{
    fn boxed(answers: impl IntoIterator<Item = PromptOutcome>) -> Box<dyn EscalationPrompter>
    {
        Box::new(Self {
            answers: answers.into_iter().collect(),
        })
    }
}

impl EscalationPrompter for ScriptedPrompter
{
    fn prompt(&mut self, _catalog: &SignalCatalog, _cancel: &PromptCancel) -> PromptOutcome
    {
        self.answers.pop_front().unwrap_or(PromptOutcome::Abort)
    }
}

/// Holds its attempt open like a terminal waiting for input, until cancelled.
struct StallingPrompter
{
    window: Duration,
    returned: Arc<AtomicBool>,
}

impl EscalationPrompter for StallingPrompter
{
    fn prompt(&mut self, _catalog: &SignalCatalog, cancel: &PromptCancel) -> PromptOutcome
    {
        let deadline = Instant::now() + self.window;
        while !cancel.is_cancelled() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        self.returned.store(true, Ordering::SeqCst);
        if cancel.is_cancelled() {
            PromptOutcome::Abort
        } else {
            PromptOutcome::Retry
        }
    }
}

/// Records every send; optionally fails, or "wakes" the target by pushing a
/// result onto the event channel.
#[derive(Default)]
struct RecordingSender
{
    sent: Mutex<Vec<(ProcessId, i32)>>,
    fail: bool,
    wake: Option<EventSender>,
}

impl RecordingSender
{
    fn sent(&self) -> Vec<(ProcessId, i32)>
    {
        self.sent.lock().unwrap().clone()
    }
}

impl SignalSender for RecordingSender
{
    fn send(&self, pid: ProcessId, signal: i32) -> InjectResult<()>
    {
        self.sent.lock().unwrap().push((pid, signal));
        if self.fail {
            return Err(InjectError::SignalSendFailed {
                pid: pid.raw(),
                signal,
                reason: "No such process".to_string(),
            });
        }
        if let Some(wake) = &self.wake {
            wake.try_send(SessionEvent::Channel(Frame::Data("woke".to_string()))).unwrap();
            wake.try_send(SessionEvent::Channel(Frame::End { residue: String::new() })).unwrap();
        }
        Ok(())
    }
}

fn catalog() -> SignalCatalog
{
    SignalCatalog::from_entries([(2, "INT"), (15, "TERM")])
}

async fn run_bounded(multiplexer: Multiplexer, events: perlinject_core::events::EventReceiver) -> SessionReport
{
    tokio::time::timeout(Duration::from_secs(10), multiplexer.run(events))
        .await
        .expect("multiplexer did not conclude")
}

#[tokio::test]
async fn test_round_trip_returns_lines_before_sentinel()
{
    let sentinel = Sentinel::generate(1, TARGET.raw());
    let input = format!("alpha\nbeta\n{}\n", sentinel.line());
    let (tx, rx) = event_channel();
    spawn_reader(Cursor::new(input.into_bytes()), sentinel, tx.clone());

    let report = run_bounded(Multiplexer::new(TARGET, LONG), rx).await;

    assert!(matches!(report.outcome, Outcome::Success(ref text) if text == "alpha\nbeta\n"));
    assert_eq!(report.stats.lines, 2);
    drop(tx);
}

#[tokio::test]
async fn test_residue_before_sentinel_is_kept()
{
    let sentinel = Sentinel::generate(1, TARGET.raw());
    let input = format!("first\nno newline{}\n", sentinel.line());
    let (tx, rx) = event_channel();
    spawn_reader(Cursor::new(input.into_bytes()), sentinel, tx);

    let report = run_bounded(Multiplexer::new(TARGET, LONG), rx).await;
    assert_eq!(report.into_result().unwrap(), "first\nno newline\n");
}

#[tokio::test]
async fn test_end_of_stream_concludes_with_accumulated_output()
{
    let (tx, rx) = event_channel();
    spawn_reader(Cursor::new(b"only line\n".to_vec()), Sentinel::generate(1, 2), tx);

    let report = run_bounded(Multiplexer::new(TARGET, LONG), rx).await;
    assert_eq!(report.into_result().unwrap(), "only line\n");
}

#[tokio::test]
async fn test_timeout_without_escalation_and_no_data()
{
    let (_tx, rx) = event_channel();

    let report = run_bounded(Multiplexer::new(TARGET, SHORT), rx).await;

    assert!(matches!(report.outcome, Outcome::TimedOut));
    assert!(report.partial.is_empty());
    assert_eq!(report.stats.prompts, 0);
}

#[tokio::test]
async fn test_timeout_keeps_partial_output()
{
    let (tx, rx) = event_channel();
    tx.send(SessionEvent::Channel(Frame::Data("half".to_string()))).await.unwrap();

    let report = run_bounded(Multiplexer::new(TARGET, SHORT), rx).await;

    assert!(matches!(report.outcome, Outcome::TimedOut));
    assert_eq!(report.partial, "half\n");
}

#[tokio::test]
async fn test_escalation_sends_signal_once_and_rearms_timer()
{
    let (tx, rx) = event_channel();
    let sender = Arc::new(RecordingSender {
        wake: Some(tx.clone()),
        ..Default::default()
    });

    let multiplexer = Multiplexer::new(TARGET, SHORT)
        .with_escalation(catalog(), ScriptedPrompter::boxed([PromptOutcome::Signal(15)]))
        .with_signal_sender(sender.clone());
    let report = run_bounded(multiplexer, rx).await;

    assert!(matches!(report.outcome, Outcome::Success(ref text) if text == "woke\n"));
    assert_eq!(sender.sent(), [(TARGET, 15)]);
    assert_eq!(report.stats.signals_sent, 1);
    assert_eq!(report.stats.timer_rearms, 1);
    assert_eq!(report.stats.prompts, 1);
}

#[tokio::test]
async fn test_signal_then_abort_on_next_expiry()
{
    let (_tx, rx) = event_channel();
    let sender = Arc::new(RecordingSender::default());

    let multiplexer = Multiplexer::new(TARGET, SHORT)
        .with_escalation(
            catalog(),
            ScriptedPrompter::boxed([PromptOutcome::Signal(2), PromptOutcome::Abort]),
        )
        .with_signal_sender(sender.clone());
    let report = run_bounded(multiplexer, rx).await;

    assert!(matches!(report.outcome, Outcome::Interrupted));
    assert_eq!(sender.sent(), [(TARGET, 2)]);
    assert_eq!(report.stats.prompts, 2);
    assert_eq!(report.stats.timer_rearms, 1);
}

#[tokio::test]
async fn test_invalid_input_reprompts_without_signal_or_rearm()
{
    let (_tx, rx) = event_channel();
    let sender = Arc::new(RecordingSender::default());

    let multiplexer = Multiplexer::new(TARGET, SHORT)
        .with_escalation(
            catalog(),
            ScriptedPrompter::boxed([PromptOutcome::Invalid("SIGFOO".to_string()), PromptOutcome::Abort]),
        )
        .with_signal_sender(sender.clone());
    let report = run_bounded(multiplexer, rx).await;

    assert!(matches!(report.outcome, Outcome::Interrupted));
    assert!(sender.sent().is_empty());
    assert_eq!(report.stats.prompts, 2);
    assert_eq!(report.stats.timer_rearms, 0);
}

#[tokio::test]
async fn test_failed_send_reprompts_without_rearm()
{
    let (_tx, rx) = event_channel();
    let sender = Arc::new(RecordingSender {
        fail: true,
        ..Default::default()
    });

    let multiplexer = Multiplexer::new(TARGET, SHORT)
        .with_escalation(
            catalog(),
            ScriptedPrompter::boxed([PromptOutcome::Signal(15), PromptOutcome::Abort]),
        )
        .with_signal_sender(sender.clone());
    let report = run_bounded(multiplexer, rx).await;

    assert!(matches!(report.outcome, Outcome::Interrupted));
    assert_eq!(sender.sent().len(), 1);
    assert_eq!(report.stats.signals_sent, 0);
    assert_eq!(report.stats.timer_rearms, 0);
    assert_eq!(report.stats.prompts, 2);
}

#[tokio::test]
async fn test_retry_rearms_and_prompts_again()
{
    let (_tx, rx) = event_channel();

    let multiplexer = Multiplexer::new(TARGET, SHORT)
        .with_escalation(catalog(), ScriptedPrompter::boxed([PromptOutcome::Retry, PromptOutcome::Abort]))
        .with_signal_sender(Arc::new(RecordingSender::default()));
    let report = run_bounded(multiplexer, rx).await;

    assert!(matches!(report.outcome, Outcome::Interrupted));
    assert_eq!(report.stats.prompts, 2);
    assert_eq!(report.stats.timer_rearms, 1);
}

#[tokio::test]
async fn test_empty_catalog_disables_escalation()
{
    let (_tx, rx) = event_channel();

    let multiplexer = Multiplexer::new(TARGET, SHORT)
        .with_escalation(SignalCatalog::default(), ScriptedPrompter::boxed([PromptOutcome::Signal(15)]));
    let report = run_bounded(multiplexer, rx).await;

    assert!(matches!(report.outcome, Outcome::TimedOut));
    assert_eq!(report.stats.prompts, 0);
}

#[tokio::test]
async fn test_fatal_stderr_line_fails_while_channel_is_open()
{
    let (tx, rx) = event_channel();
    let _channel_still_open = tx.clone();
    spawn_stream_watcher(
        DebuggerStream::Stderr,
        Cursor::new(b"Attaching to process 4242\nptrace: Permission denied.\n".to_vec()),
        tx,
    );

    let report = run_bounded(Multiplexer::new(TARGET, LONG), rx).await;

    assert!(matches!(
        report.outcome,
        Outcome::DebuggerFailed(InjectError::DebuggerFatal(ref line)) if line.contains("permission denied")
    ));
}

#[tokio::test]
async fn test_fatal_line_keeps_partial_output()
{
    let (tx, rx) = event_channel();
    tx.send(SessionEvent::Channel(Frame::Data("before".to_string()))).await.unwrap();
    tx.send(SessionEvent::DebuggerFatal {
        line: "operation not permitted".to_string(),
    })
    .await
    .unwrap();

    let report = run_bounded(Multiplexer::new(TARGET, LONG), rx).await;
    assert!(matches!(report.outcome, Outcome::DebuggerFailed(_)));
    assert_eq!(report.partial, "before\n");
}

#[tokio::test]
async fn test_channel_payload_is_never_matched_as_fatal()
{
    let sentinel = Sentinel::generate(1, 2);
    let input = format!("open: Permission denied\n{}\n", sentinel.line());
    let (tx, rx) = event_channel();
    spawn_reader(Cursor::new(input.into_bytes()), sentinel, tx);

    let report = run_bounded(Multiplexer::new(TARGET, LONG), rx).await;
    assert_eq!(report.into_result().unwrap(), "open: Permission denied\n");
}

#[tokio::test]
async fn test_debugger_exit_without_sentinel_fails_after_grace()
{
    let (tx, rx) = event_channel();
    tx.send(SessionEvent::DebuggerExited { status: None }).await.unwrap();

    let multiplexer = Multiplexer::new(TARGET, LONG).with_exit_grace(SHORT);
    let report = run_bounded(multiplexer, rx).await;

    assert!(matches!(report.outcome, Outcome::DebuggerFailed(InjectError::DebuggerExited(_))));
}

#[tokio::test]
async fn test_sentinel_within_exit_grace_succeeds()
{
    let (tx, rx) = event_channel();
    tx.send(SessionEvent::DebuggerExited { status: None }).await.unwrap();
    tx.send(SessionEvent::Channel(Frame::Data("late".to_string()))).await.unwrap();
    tx.send(SessionEvent::Channel(Frame::End { residue: String::new() })).await.unwrap();

    let multiplexer = Multiplexer::new(TARGET, LONG).with_exit_grace(Duration::from_secs(5));
    let report = run_bounded(multiplexer, rx).await;

    assert_eq!(report.into_result().unwrap(), "late\n");
}

#[tokio::test]
async fn test_operator_interrupt()
{
    let (tx, rx) = event_channel();
    tx.send(SessionEvent::OperatorInterrupt).await.unwrap();

    let report = run_bounded(Multiplexer::new(TARGET, LONG), rx).await;
    assert!(matches!(report.outcome, Outcome::Interrupted));
}

#[tokio::test]
async fn test_channel_read_error_is_a_failure()
{
    let (tx, rx) = event_channel();
    tx.send(SessionEvent::ChannelClosed {
        error: Some("Input/output error".to_string()),
    })
    .await
    .unwrap();

    let report = run_bounded(Multiplexer::new(TARGET, LONG), rx).await;
    assert!(matches!(report.outcome, Outcome::DebuggerFailed(InjectError::ChannelRead(_))));
}

#[tokio::test]
async fn test_sentinel_during_prompt_waits_for_the_prompt_to_return()
{
    let (tx, rx) = event_channel();
    let late = tx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        late.send(SessionEvent::Channel(Frame::Data("late".to_string()))).await.unwrap();
        late.send(SessionEvent::Channel(Frame::End { residue: String::new() })).await.unwrap();
    });

    let returned = Arc::new(AtomicBool::new(false));
    let prompter = Box::new(StallingPrompter {
        window: Duration::from_secs(20),
        returned: Arc::clone(&returned),
    });
    let started = Instant::now();
    let report = run_bounded(Multiplexer::new(TARGET, SHORT).with_escalation(catalog(), prompter), rx).await;

    assert!(matches!(report.outcome, Outcome::Success(ref text) if text == "late\n"));
    assert_eq!(report.stats.prompts, 1);
    assert!(returned.load(Ordering::SeqCst), "prompt still running after the session concluded");
    assert!(started.elapsed() < Duration::from_secs(5));
    drop(tx);
}
