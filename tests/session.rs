mod support;

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use assert_matches::assert_matches;
use devicebridge::codec::{encode_hex, encode_hex_bytes};
use devicebridge::{
    run_session, CancellationFlag, Command, DebugEvent, LaunchRequest, SessionConfig,
    SessionController, SessionEnd, SessionError, SessionReport, SessionState, TransportError,
    ABNORMAL_STOP_EXIT_STATUS,
};
use pretty_assertions::assert_eq;

use support::{
    demo_app, fast_config, lock_unpoisoned, output_lines, recording_sink, Incoming, Reply,
    Script, ScriptedConnector, ScriptedTransport, TransportTrace, BUNDLE_ID, BUNDLE_PATH,
    CONTAINER,
};

struct Outcome {
    result: Result<SessionReport, SessionError>,
    trace: Arc<Mutex<TransportTrace>>,
    events: support::EventLog,
    cancel: CancellationFlag,
}

fn run_with(script: Script, request: LaunchRequest) -> Outcome {
    run_with_cancel(script, request, CancellationFlag::new())
}

fn run_with_cancel(script: Script, request: LaunchRequest, cancel: CancellationFlag) -> Outcome {
    let trace = Arc::new(Mutex::new(TransportTrace::default()));
    let connector = ScriptedConnector::new(script, Arc::clone(&trace));
    let (sink, events) = recording_sink();
    let config = fast_config();

    let result = run_session(
        &connector,
        &demo_app(),
        &request,
        &config,
        &cancel,
        sink.as_ref(),
    );

    Outcome {
        result,
        trace,
        events,
        cancel,
    }
}

fn exit_payload(tag: char, value: u8) -> String {
    format!("{tag}{}", encode_hex_bytes(&[value]))
}

fn executable() -> String {
    format!("{BUNDLE_PATH}/Demo")
}

#[test]
fn output_then_exit_runs_full_lifecycle() {
    let script = Script::happy()
        .payload(&format!("O{}", encode_hex("hi")))
        .payload(&exit_payload('W', 0));

    let outcome = run_with(script, LaunchRequest::new(BUNDLE_ID));

    let report = outcome.result.expect("session succeeds");
    assert_eq!(
        report,
        SessionReport {
            end: SessionEnd::Exited,
            exit_status: Some(0),
        }
    );
    assert_eq!(output_lines(&outcome.events), vec!["hi".to_string()]);
    assert_eq!(
        lock_unpoisoned(&outcome.events).last(),
        Some(&DebugEvent::Exited {
            code: 0,
            via_signal: false
        })
    );

    let trace = lock_unpoisoned(&outcome.trace);
    let working_dir = format!("QSetWorkingDir:{CONTAINER}");
    let argv = Command::set_argv(&[executable()]).encode();
    assert_eq!(
        trace.sent_verbs(),
        vec![
            "QSetMaxPacketSize:1024",
            working_dir.as_str(),
            argv.as_str(),
            "qLaunchSuccess",
            "Hc0",
            "c",
            "\u{3}",
            "k",
        ]
    );
    assert_eq!(
        trace.receive_params,
        vec![
            (true, Duration::from_millis(10)),
            (false, Duration::from_millis(20)),
        ]
    );
    assert_eq!(trace.releases, 1);
    assert!(!outcome.cancel.is_requested());
}

#[test]
fn working_directory_rejection_aborts_before_launch() {
    let script = Script::happy().respond("QSetWorkingDir:", "Ebaddir");

    let outcome = run_with(script, LaunchRequest::new(BUNDLE_ID));

    assert_matches!(
        outcome.result,
        Err(SessionError::Rejected { step: "set-working-directory", ref response }) if response == "Ebaddir"
    );

    let trace = lock_unpoisoned(&outcome.trace);
    let working_dir = format!("QSetWorkingDir:{CONTAINER}");
    assert_eq!(
        trace.sent_verbs(),
        vec!["QSetMaxPacketSize:1024", working_dir.as_str()]
    );
    assert!(!trace.was_sent("\u{3}"));
    assert!(!trace.was_sent("k"));
    assert_eq!(trace.releases, 1);

    let events = lock_unpoisoned(&outcome.events);
    assert_eq!(events[0], DebugEvent::RemoteError("baddir".to_string()));
    assert_matches!(events[1], DebugEvent::SessionFailed(_));
    assert_eq!(events.len(), 2);
}

#[test]
fn packet_size_rejection_aborts_immediately() {
    let script = Script::happy().respond("QSetMaxPacketSize:", "E01");
    let outcome = run_with(script, LaunchRequest::new(BUNDLE_ID));

    assert_matches!(
        outcome.result,
        Err(SessionError::Rejected {
            step: "set-max-packet-size",
            ..
        })
    );
    let trace = lock_unpoisoned(&outcome.trace);
    assert_eq!(trace.sent, vec!["QSetMaxPacketSize:1024".to_string()]);
    assert_eq!(trace.releases, 1);
}

#[test]
fn transport_failure_during_setup_aborts() {
    let script = Script::happy().reply("QSetMaxPacketSize:", Reply::Closed);
    let outcome = run_with(script, LaunchRequest::new(BUNDLE_ID));

    assert_matches!(
        outcome.result,
        Err(SessionError::Send {
            step: "set-max-packet-size",
            source: TransportError::Closed
        })
    );
    assert_eq!(lock_unpoisoned(&outcome.trace).releases, 1);
}

#[test]
fn silent_setup_steps_are_accepted() {
    let script = Script::happy()
        .reply("QSetMaxPacketSize:", Reply::Silent)
        .reply("QSetWorkingDir:", Reply::Silent)
        .payload(&exit_payload('W', 3));

    let outcome = run_with(script, LaunchRequest::new(BUNDLE_ID));
    assert_eq!(outcome.result.expect("session").exit_status, Some(3));
}

#[test]
fn launch_failure_releases_without_kill() {
    let script = Script::happy().respond("qLaunchSuccess", "Efailed to launch");
    let outcome = run_with(script, LaunchRequest::new(BUNDLE_ID));

    assert_matches!(
        outcome.result,
        Err(SessionError::Rejected {
            step: "launch-success",
            ..
        })
    );
    let trace = lock_unpoisoned(&outcome.trace);
    assert!(!trace.was_sent("c"));
    assert!(!trace.was_sent("k"));
    assert_eq!(trace.releases, 1);
    assert_eq!(
        lock_unpoisoned(&outcome.events)[0],
        DebugEvent::RemoteError("failed to launch".to_string())
    );
}

#[test]
fn environment_and_arguments_are_sent_in_order() {
    let script = Script::happy().payload(&exit_payload('W', 0));
    let request = LaunchRequest::new(BUNDLE_ID)
        .with_environment("A=1  B=two")
        .with_arguments(" -v   --mode fast ");

    let outcome = run_with(script, request);
    outcome.result.expect("session");

    let trace = lock_unpoisoned(&outcome.trace);
    let argv = Command::set_argv(&[
        executable(),
        "-v".to_string(),
        "--mode".to_string(),
        "fast".to_string(),
    ])
    .encode();
    assert_eq!(
        &trace.sent[2..5],
        &[
            format!("QEnvironmentHexEncoded:{}", encode_hex("A=1")),
            format!("QEnvironmentHexEncoded:{}", encode_hex("B=two")),
            argv,
        ]
    );
}

#[test]
fn environment_failures_are_best_effort() {
    let script = Script::happy()
        .respond("QEnvironmentHexEncoded:", "E22")
        .payload(&exit_payload('W', 0));
    let outcome = run_with(script, LaunchRequest::new(BUNDLE_ID).with_environment("A=1"));

    assert_eq!(
        outcome.result.expect("session").end,
        SessionEnd::Exited
    );
    assert!(lock_unpoisoned(&outcome.events)
        .iter()
        .all(|event| !matches!(event, DebugEvent::RemoteError(_))));
}

#[test]
fn detach_ends_successfully_whatever_the_reply() {
    let script = Script::happy().respond("D", "E99");
    let outcome = run_with(script, LaunchRequest::new(BUNDLE_ID).detached());

    assert_eq!(
        outcome.result.expect("detach succeeds"),
        SessionReport {
            end: SessionEnd::Detached,
            exit_status: None,
        }
    );
    let trace = lock_unpoisoned(&outcome.trace);
    assert_eq!(trace.sent.last().map(String::as_str), Some("D"));
    assert!(!trace.was_sent("c"));
    assert!(!trace.was_sent("k"));
    assert_eq!(trace.releases, 1);
}

#[test]
fn detach_survives_transport_failure() {
    let script = Script::happy().reply("D", Reply::Closed);
    let outcome = run_with(script, LaunchRequest::new(BUNDLE_ID).detached());
    assert_eq!(outcome.result.expect("detach succeeds").end, SessionEnd::Detached);
}

#[test]
fn thread_stop_reports_abort_status() {
    let script = Script::happy().payload("T05thread:1;");
    let outcome = run_with(script, LaunchRequest::new(BUNDLE_ID));

    let report = outcome.result.expect("session");
    assert_eq!(report.end, SessionEnd::Stopped);
    assert_eq!(report.exit_status, Some(ABNORMAL_STOP_EXIT_STATUS));
    assert_eq!(
        lock_unpoisoned(&outcome.events).as_slice(),
        &[DebugEvent::ThreadStopped("05thread:1;".to_string())]
    );
    let trace = lock_unpoisoned(&outcome.trace);
    assert!(trace.was_sent("\u{3}"));
    assert!(trace.was_sent("k"));
}

#[test]
fn errors_and_noise_do_not_end_monitoring() {
    let script = Script::happy()
        .payload("E01")
        .payload("Zgarbage")
        .payload("")
        .payload("OK")
        .payload("Wzz")
        .payload(&format!("O{}", encode_hex("still running")))
        .payload(&exit_payload('X', 11));

    let outcome = run_with(script, LaunchRequest::new(BUNDLE_ID));

    let report = outcome.result.expect("session");
    assert_eq!(report.end, SessionEnd::Exited);
    assert_eq!(report.exit_status, Some(139));
    assert_eq!(
        lock_unpoisoned(&outcome.events).as_slice(),
        &[
            DebugEvent::RemoteError("01".to_string()),
            DebugEvent::Unrecognized("Zgarbage".to_string()),
            DebugEvent::Unrecognized("Wzz".to_string()),
            DebugEvent::Output("still running".to_string()),
            DebugEvent::Exited {
                code: 139,
                via_signal: true
            },
        ]
    );
    assert_eq!(lock_unpoisoned(&outcome.trace).receives, 7);
}

#[test]
fn continue_reply_is_the_first_monitored_payload() {
    let script = Script::happy().respond("c", &exit_payload('W', 7));
    let outcome = run_with(script, LaunchRequest::new(BUNDLE_ID));

    assert_eq!(outcome.result.expect("session").exit_status, Some(7));
    assert_eq!(lock_unpoisoned(&outcome.trace).receives, 0);
}

#[test]
fn shutdown_replies_are_not_reported() {
    let script = Script::happy()
        .payload(&exit_payload('W', 0))
        .respond("\u{3}", "T11thread:1;")
        .respond("k", "X09");

    let outcome = run_with(script, LaunchRequest::new(BUNDLE_ID));

    assert_eq!(outcome.result.expect("session").exit_status, Some(0));
    assert_eq!(
        lock_unpoisoned(&outcome.events).as_slice(),
        &[DebugEvent::Exited {
            code: 0,
            via_signal: false
        }]
    );
}

#[test]
fn receive_failure_still_interrupts_and_kills() {
    let script = Script::happy()
        .payload(&format!("O{}", encode_hex("before")))
        .incoming(Incoming::Closed);

    let outcome = run_with(script, LaunchRequest::new(BUNDLE_ID));

    let report = outcome.result.expect("session");
    assert_matches!(report.end, SessionEnd::ReceiveFailed(_));
    assert_eq!(report.exit_status, None);

    let trace = lock_unpoisoned(&outcome.trace);
    assert_eq!(&trace.sent[trace.sent.len() - 2..], &["\u{3}", "k"]);
    assert_eq!(trace.releases, 1);
    assert_matches!(
        lock_unpoisoned(&outcome.events).last(),
        Some(DebugEvent::SessionFailed(_))
    );
}

#[test]
fn cancellation_during_monitoring_stops_within_a_poll() {
    let cancel = CancellationFlag::new();
    let stopper = cancel.clone();
    let script = Script::happy().incoming(Incoming::WaitForCancel);

    let started = Instant::now();
    let requester = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        stopper.request();
    });
    let outcome = run_with_cancel(script, LaunchRequest::new(BUNDLE_ID), cancel);
    requester.join().expect("requester");

    assert_eq!(
        outcome.result.expect("session"),
        SessionReport {
            end: SessionEnd::Cancelled,
            exit_status: None,
        }
    );
    assert!(started.elapsed() < Duration::from_secs(2));

    let trace = lock_unpoisoned(&outcome.trace);
    assert_eq!(&trace.sent[trace.sent.len() - 2..], &["\u{3}", "k"]);
    assert_eq!(trace.receive_params.last(), Some(&(false, Duration::from_millis(20))));
    assert_eq!(trace.releases, 1);
    assert!(!outcome.cancel.is_requested());
}

#[test]
fn cancellation_between_payloads_is_honoured() {
    let cancel = CancellationFlag::new();
    cancel.request();
    let script = Script::happy()
        .respond("c", &format!("O{}", encode_hex("first")))
        .payload(&exit_payload('W', 0));

    // Setup commands in the scripted transport answer without waiting, so the
    // pre-set flag is first observed after the continue reply is handled.
    let outcome = run_with_cancel(script, LaunchRequest::new(BUNDLE_ID), cancel);

    assert_eq!(outcome.result.expect("session").end, SessionEnd::Cancelled);
    assert_eq!(output_lines(&outcome.events), vec!["first".to_string()]);
    assert_eq!(lock_unpoisoned(&outcome.trace).receives, 0);
    assert!(!outcome.cancel.is_requested());
}

#[test]
fn stub_start_failure_reports_guidance_and_resets_flag() {
    let connector = ScriptedConnector::failing();
    let (sink, events) = recording_sink();
    let cancel = CancellationFlag::new();
    cancel.request();

    let result = run_session(
        &connector,
        &demo_app(),
        &LaunchRequest::new(BUNDLE_ID),
        &SessionConfig::default(),
        &cancel,
        sink.as_ref(),
    );

    assert_matches!(
        result,
        Err(SessionError::StubStart(TransportError::ServiceStart { .. }))
    );
    assert_eq!(
        *lock_unpoisoned(&connector.services),
        vec!["com.apple.debugserver".to_string()]
    );
    assert_matches!(
        lock_unpoisoned(&events).as_slice(),
        [DebugEvent::SessionFailed(message)] if message.contains("developer disk image")
    );
    assert!(!cancel.is_requested());
}

#[test]
fn controller_can_drive_a_transport_directly() {
    let trace = Arc::new(Mutex::new(TransportTrace::default()));
    let transport = ScriptedTransport::new(
        Script::happy().payload(&exit_payload('W', 1)),
        Arc::clone(&trace),
    );
    let (sink, _events) = recording_sink();
    let config = fast_config();
    let request = LaunchRequest::new(BUNDLE_ID).with_arguments("--flag");
    let state = SessionState::new(&demo_app(), &request);
    assert_eq!(state.process_arguments, vec![executable(), "--flag".to_string()]);
    assert_eq!(state.container_path, CONTAINER);

    let report = SessionController::new(
        Box::new(transport),
        state,
        &config,
        CancellationFlag::new(),
        sink.as_ref(),
    )
    .run(false)
    .expect("session");

    assert_eq!(report.exit_status, Some(1));
    assert_eq!(lock_unpoisoned(&trace).releases, 1);
}
