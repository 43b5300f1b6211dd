//! Integration tests for the recognition orchestrator
//!
//! Covers ordering, confidence gating, fusion tie-break, failure isolation,
//! per-invocation timeouts and the audit trail of a request.

mod helpers;

use std::sync::Arc;
use std::time::Duration;

use helpers::{mock_plugin, FailingAuditSink, LogCapture, MockRecognizer};
use talkkin_common::audit::{
    AuditBus, AuditEvent, AuditKind, AuditSink, FanoutAuditSink, JsonlAuditSink, MemoryAuditSink,
    TracingAuditSink,
};
use talkkin_common::config::{PluginOverride, TomlConfig};
use talkkin_router::orchestrator::NO_RESULT_REASON;
use talkkin_router::{
    OrchestratorConfig, PluginRegistry, RecognitionInput, RecognitionOrchestrator, RoutingError,
    TieBreak, TraceEntry, Winner,
};
use tempfile::TempDir;

fn orchestrator(
    registry: PluginRegistry,
    config: OrchestratorConfig,
) -> (RecognitionOrchestrator, MemoryAuditSink) {
    let audit = MemoryAuditSink::new();
    let orchestrator = RecognitionOrchestrator::new(registry, config, Arc::new(audit.clone()));
    (orchestrator, audit)
}

fn input() -> RecognitionInput {
    RecognitionInput::audio(vec![0u8; 16])
}

// ============================================================================
// Gating and fusion
// ============================================================================

#[tokio::test]
async fn test_low_confidence_plugin_excluded_but_traced() {
    let (a, _) = mock_plugin("A", MockRecognizer::answering("bonjour", 0.85));
    let (b, _) = mock_plugin("B", MockRecognizer::answering("bonsoir", 0.3));
    let registry = PluginRegistry::from_descriptors([
        a.with_priority(2).with_min_confidence(0.5),
        b.with_priority(1).with_min_confidence(0.5),
    ])
    .unwrap();
    let (orchestrator, _) = orchestrator(registry, OrchestratorConfig::default());

    let outcome = orchestrator.recognize(&input()).await;

    assert_eq!(outcome.candidates.len(), 1);
    assert_eq!(outcome.candidates[0].source_plugin, "A");
    assert_eq!(outcome.winner().unwrap().source_plugin, "A");
    assert_eq!(outcome.winner().unwrap().text, "bonjour");

    let traced: Vec<&str> = outcome.trace.iter().map(|t| t.plugin()).collect();
    assert_eq!(traced, vec!["A", "B"]);
    match &outcome.trace[1] {
        TraceEntry::Result { passed_gate, result, .. } => {
            assert!(!passed_gate);
            assert_eq!(result.confidence, 0.3);
        }
        other => panic!("Expected a result entry for B, got {:?}", other),
    }
}

#[tokio::test]
async fn test_gate_is_strict() {
    // Confidence equal to the threshold does not pass
    let (edge, _) = mock_plugin("edge", MockRecognizer::answering("x", 0.5));
    let registry = PluginRegistry::from_descriptors([edge.with_min_confidence(0.5)]).unwrap();
    let (orchestrator, _) = orchestrator(registry, OrchestratorConfig::default());

    let outcome = orchestrator.recognize(&input()).await;
    assert!(outcome.candidates.is_empty());
    assert_eq!(
        outcome.winner,
        Winner::NoResult {
            reason: NO_RESULT_REASON.to_string()
        }
    );
}

#[tokio::test]
async fn test_candidates_always_pass_their_own_gate() {
    let plugins = [
        ("audio", 0.9, 0.95),
        ("ocr", 0.7, 0.5),
        ("labial", 0.4, 0.3),
        ("gesture", 0.6, 0.6),
    ];
    let registry = PluginRegistry::from_descriptors(plugins.iter().map(|(name, conf, gate)| {
        mock_plugin(name, MockRecognizer::answering(name, *conf))
            .0
            .with_min_confidence(*gate)
    }))
    .unwrap();
    let (orchestrator, _) = orchestrator(registry, OrchestratorConfig::default());

    let outcome = orchestrator.recognize(&input()).await;
    let names: Vec<&str> = outcome.candidates.iter().map(|c| c.source_plugin.as_str()).collect();
    assert_eq!(names, vec!["ocr", "labial"]);
    assert_eq!(outcome.trace.len(), 4);
    assert_eq!(outcome.winner().unwrap().source_plugin, "ocr");
}

#[tokio::test]
async fn test_equal_confidence_earliest_registered_wins() {
    // Higher priority for the later plugin so invocation order differs from
    // registration order
    let (first, _) = mock_plugin("first", MockRecognizer::answering("one", 0.8));
    let (second, _) = mock_plugin("second", MockRecognizer::answering("two", 0.8));
    let registry =
        PluginRegistry::from_descriptors([first.with_priority(1), second.with_priority(5)]).unwrap();
    let (orchestrator, _) = orchestrator(registry, OrchestratorConfig::default());

    for _ in 0..5 {
        let outcome = orchestrator.recognize(&input()).await;
        assert_eq!(outcome.candidates[0].source_plugin, "second");
        assert_eq!(outcome.winner().unwrap().source_plugin, "first");
    }
}

#[tokio::test]
async fn test_last_registered_tie_break() {
    let (first, _) = mock_plugin("first", MockRecognizer::answering("one", 0.8));
    let (second, _) = mock_plugin("second", MockRecognizer::answering("two", 0.8));
    let registry = PluginRegistry::from_descriptors([first, second]).unwrap();
    let config = OrchestratorConfig {
        tie_break: TieBreak::LastRegistered,
        ..OrchestratorConfig::default()
    };
    let (orchestrator, _) = orchestrator(registry, config);

    let outcome = orchestrator.recognize(&input()).await;
    assert_eq!(outcome.winner().unwrap().source_plugin, "second");
}

#[tokio::test]
async fn test_no_plugins_yields_no_result() {
    let (orchestrator, audit) = orchestrator(PluginRegistry::new(), OrchestratorConfig::default());

    let outcome = orchestrator.recognize(&input()).await;
    assert!(outcome.winner().is_none());
    assert!(outcome.trace.is_empty());
    assert_eq!(audit.events_of(AuditKind::Decision).len(), 1);

    match outcome.into_result() {
        Err(RoutingError::NoViableResult { trace }) => assert!(trace.is_empty()),
        other => panic!("Expected NoViableResult, got {:?}", other),
    }
}

// ============================================================================
// Ordering and early stop
// ============================================================================

#[tokio::test]
async fn test_stop_on_first_success() {
    let (low, low_calls) = mock_plugin("low", MockRecognizer::answering("weak", 0.2));
    let (good, good_calls) = mock_plugin("good", MockRecognizer::answering("strong", 0.7));
    let (better, better_calls) = mock_plugin("better", MockRecognizer::answering("best", 0.99));
    let registry = PluginRegistry::from_descriptors([
        low.with_priority(10),
        good.with_priority(5),
        better.with_priority(1),
    ])
    .unwrap();
    let config = OrchestratorConfig {
        stop_on_first_success: true,
        ..OrchestratorConfig::default()
    };
    let (orchestrator, _) = orchestrator(registry, config);

    let outcome = orchestrator.recognize(&input()).await;
    assert_eq!(outcome.winner().unwrap().source_plugin, "good");
    assert_eq!(outcome.trace.len(), 2);
    assert_eq!(low_calls.get(), 1);
    assert_eq!(good_calls.get(), 1);
    assert_eq!(better_calls.get(), 0);
}

#[tokio::test]
async fn test_disabled_and_reprioritized_plugins() {
    let (audio, audio_calls) = mock_plugin("audio", MockRecognizer::answering("a", 0.9));
    let (ocr, _) = mock_plugin("ocr", MockRecognizer::answering("o", 0.9));
    let (labial, labial_calls) = mock_plugin("labial", MockRecognizer::answering("l", 0.9));
    let registry = PluginRegistry::from_descriptors([audio, ocr, labial.disabled()]).unwrap();
    let (orchestrator, _) = orchestrator(registry, OrchestratorConfig::default());

    assert_eq!(orchestrator.ordered_plugin_names().await, vec!["audio", "ocr"]);

    orchestrator.set_plugin_enabled("audio", false).await.unwrap();
    orchestrator.set_plugin_enabled("labial", true).await.unwrap();
    orchestrator.set_plugin_priority("labial", 3).await.unwrap();
    assert_eq!(orchestrator.ordered_plugin_names().await, vec!["labial", "ocr"]);

    let outcome = orchestrator.recognize(&input()).await;
    assert_eq!(audio_calls.get(), 0);
    assert_eq!(labial_calls.get(), 1);
    assert_eq!(outcome.winner().unwrap().source_plugin, "ocr");

    assert!(matches!(
        orchestrator.set_plugin_enabled("missing", true).await,
        Err(RoutingError::PluginNotFound(_))
    ));
}

#[tokio::test]
async fn test_enable_change_logged_only_when_applied() {
    let (audio, _) = mock_plugin("audio", MockRecognizer::answering("a", 0.9));
    let registry = PluginRegistry::from_descriptors([audio]).unwrap();
    let (orchestrator, _) = orchestrator(registry, OrchestratorConfig::default());
    let (logs, _guard) = LogCapture::install();

    assert!(orchestrator.set_plugin_enabled("ghost", false).await.is_err());
    assert_eq!(logs.count_matching("Plugin enabled state changed"), 0);

    orchestrator.set_plugin_enabled("audio", false).await.unwrap();
    assert_eq!(logs.count_matching("Plugin enabled state changed"), 1);
}

#[tokio::test]
async fn test_add_and_remove_plugins_at_runtime() {
    let (orchestrator, _) = orchestrator(PluginRegistry::new(), OrchestratorConfig::default());
    let (audio, _) = mock_plugin("audio", MockRecognizer::answering("a", 0.9));
    let (dup, _) = mock_plugin("audio", MockRecognizer::answering("b", 0.9));

    assert_eq!(orchestrator.add_plugin(audio).await.unwrap(), 0);
    assert!(matches!(
        orchestrator.add_plugin(dup).await,
        Err(RoutingError::DuplicatePlugin(_))
    ));
    assert!(orchestrator.recognize(&input()).await.winner().is_some());

    orchestrator.remove_plugin("audio").await.unwrap();
    assert!(orchestrator.recognize(&input()).await.winner().is_none());
}

#[tokio::test]
async fn test_config_overrides_applied() {
    let mut config = TomlConfig::default();
    config.routing.stop_on_first_success = true;
    config.routing.plugins.insert(
        "ocr".to_string(),
        PluginOverride {
            priority: Some(9),
            enabled: None,
            min_confidence: Some(0.1),
        },
    );
    let (audio, _) = mock_plugin("audio", MockRecognizer::answering("a", 0.9));
    let (ocr, _) = mock_plugin("ocr", MockRecognizer::answering("o", 0.2));
    let registry = PluginRegistry::from_descriptors([audio, ocr]).unwrap();

    let orchestrator =
        RecognitionOrchestrator::from_config(registry, &config, Arc::new(MemoryAuditSink::new()));
    assert!(orchestrator.config().stop_on_first_success);

    let outcome = orchestrator.recognize(&input()).await;
    assert_eq!(outcome.winner().unwrap().source_plugin, "ocr");
    assert_eq!(outcome.trace.len(), 1);
}

// ============================================================================
// Failure isolation
// ============================================================================

#[tokio::test]
async fn test_failing_plugin_does_not_abort_pipeline() {
    let (broken, _) = mock_plugin("broken", MockRecognizer::failing("model not loaded"));
    let (ocr, ocr_calls) = mock_plugin("ocr", MockRecognizer::answering("texte", 0.75));
    let registry =
        PluginRegistry::from_descriptors([broken.with_priority(5), ocr.with_priority(1)]).unwrap();
    let (orchestrator, audit) = orchestrator(registry, OrchestratorConfig::default());

    let outcome = orchestrator.recognize(&input()).await;
    assert_eq!(ocr_calls.get(), 1);
    assert_eq!(outcome.winner().unwrap().text, "texte");
    assert!(outcome.trace[0].is_error());
    assert_eq!(outcome.trace[0].plugin(), "broken");

    let errors = audit.events_of(AuditKind::Error);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].source, "broken");
    assert!(errors[0].message.contains("model not loaded"));
}

#[tokio::test(start_paused = true)]
async fn test_slow_plugin_times_out() {
    let (slow, _) = mock_plugin(
        "slow",
        MockRecognizer::slow(Duration::from_secs(60), "late", 0.99),
    );
    let (fast, _) = mock_plugin("fast", MockRecognizer::answering("on time", 0.6));
    let registry = PluginRegistry::from_descriptors([slow.with_priority(2), fast]).unwrap();
    let config = OrchestratorConfig {
        invocation_timeout: Duration::from_secs(5),
        ..OrchestratorConfig::default()
    };
    let (orchestrator, _) = orchestrator(registry, config);

    let outcome = orchestrator.recognize(&input()).await;
    assert_eq!(outcome.winner().unwrap().source_plugin, "fast");
    match &outcome.trace[0] {
        TraceEntry::Error { plugin, error } => {
            assert_eq!(plugin, "slow");
            assert!(error.contains("Timed out"));
        }
        other => panic!("Expected a timeout entry, got {:?}", other),
    }
}

#[tokio::test]
async fn test_audit_failure_does_not_block_recognition() {
    let (audio, _) = mock_plugin("audio", MockRecognizer::answering("hola", 0.9));
    let registry = PluginRegistry::from_descriptors([audio]).unwrap();
    let sink = Arc::new(FailingAuditSink::default());
    let orchestrator =
        RecognitionOrchestrator::new(registry, OrchestratorConfig::default(), sink.clone());

    let outcome = orchestrator.recognize(&input()).await;
    assert_eq!(outcome.winner().unwrap().text, "hola");
    // One info event plus the decision
    assert_eq!(sink.attempts.get(), 2);
}

// ============================================================================
// Audit trail
// ============================================================================

#[tokio::test]
async fn test_audit_trail_of_a_request() {
    let (audio, _) = mock_plugin("audio", MockRecognizer::answering("hello", 0.9));
    let (ocr, _) = mock_plugin("ocr", MockRecognizer::answering("hallo", 0.4));
    let (broken, _) = mock_plugin("broken", MockRecognizer::failing("boom"));
    let registry = PluginRegistry::from_descriptors([audio, ocr, broken]).unwrap();
    let (orchestrator, audit) = orchestrator(registry, OrchestratorConfig::default());

    let request = input().with_locale("en").with_user("user-42");
    let outcome = orchestrator.recognize(&request).await;

    let events = audit.events();
    let kinds: Vec<AuditKind> = events.iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![AuditKind::Info, AuditKind::Info, AuditKind::Error, AuditKind::Decision]
    );
    for event in &events {
        assert_eq!(event.locale, "en");
        assert_eq!(event.user_id.as_deref(), Some("user-42"));
    }

    let info = &events[1];
    assert_eq!(info.source, "ocr");
    assert_eq!(info.data["passedGate"], false);

    let decision = &events[3];
    assert_eq!(decision.source, "orchestrator");
    assert_eq!(decision.data["requestId"], outcome.request_id.to_string());
    assert_eq!(decision.data["winner"]["status"], "selected");
    assert_eq!(decision.data["winner"]["sourcePlugin"], "audio");
    assert_eq!(decision.data["candidates"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_default_locale_when_request_has_none() {
    let (audio, _) = mock_plugin("audio", MockRecognizer::answering("salut", 0.9));
    let registry = PluginRegistry::from_descriptors([audio]).unwrap();
    let (orchestrator, audit) = orchestrator(registry, OrchestratorConfig::default());

    orchestrator.recognize(&input()).await;
    assert!(audit.events().iter().all(|e| e.locale == "fr" && e.user_id.is_none()));
}

#[tokio::test]
async fn test_audit_fanout_to_file_bus_and_log() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("audit.jsonl");
    let bus = AuditBus::new(16);
    let mut rx = bus.subscribe();
    let sinks: Vec<Arc<dyn AuditSink>> = vec![
        Arc::new(JsonlAuditSink::open(&path).unwrap()),
        Arc::new(bus),
        Arc::new(TracingAuditSink),
    ];

    let (audio, _) = mock_plugin("audio", MockRecognizer::answering("ok", 0.9));
    let registry = PluginRegistry::from_descriptors([audio]).unwrap();
    let orchestrator = RecognitionOrchestrator::new(
        registry,
        OrchestratorConfig::default(),
        Arc::new(FanoutAuditSink::new(sinks)),
    );
    orchestrator.recognize(&input().with_user("u1")).await;

    let lines: Vec<AuditEvent> = std::fs::read_to_string(&path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[1].kind, AuditKind::Decision);
    assert_eq!(lines[1].user_id.as_deref(), Some("u1"));

    assert_eq!(rx.try_recv().unwrap().kind, AuditKind::Info);
    assert_eq!(rx.try_recv().unwrap().kind, AuditKind::Decision);
}
