//! # Dispatcher Integration Tests
//!
//! End-to-end chain executions against the mock backend:
//!
//! 1. Pure set chains - payload lands in state, nothing else moves
//! 2. Catalog chains - flag-guarded fetches, success and failure paths
//! 3. Inference chain - guard, flag transition, result storage
//! 4. Concurrency - unrelated triggers interleave at suspension points

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;

use synapse::backend::{BackendError, MockBackend};
use synapse::manifest::{AgentInfo, FrameworkManifest, InferResponse, ModelManifest, Prediction};
use synapse::signal::Signal;
use synapse::types::{Device, ManifestKey, Page};
use synapse::{Dispatcher, EventKind};

// ============================================================================
// TEST HELPERS
// ============================================================================

fn framework(name: &str, version: &str) -> FrameworkManifest {
    FrameworkManifest {
        name: name.to_string(),
        version: version.to_string(),
        container: None,
        agents: Vec::new(),
    }
}

fn model(name: &str) -> ModelManifest {
    ModelManifest {
        name: name.to_string(),
        version: "latest".to_string(),
        framework: None,
        description: None,
        agents: Vec::new(),
    }
}

fn agent(host: &str) -> AgentInfo {
    AgentInfo {
        host: host.to_string(),
        port: 8601,
        architecture: None,
    }
}

fn tabby_response() -> InferResponse {
    InferResponse {
        predictions: vec![
            Prediction {
                label: "tabby cat".into(),
                probability: 0.93,
            },
            Prediction {
                label: "tiger cat".into(),
                probability: 0.04,
            },
        ],
    }
}

fn selection(keys: &[&str]) -> BTreeMap<String, bool> {
    keys.iter().map(|key| (key.to_string(), true)).collect()
}

// ============================================================================
// PURE SET CHAINS
// ============================================================================

mod set_chains {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn predict_url_changed_sets_only_the_url() {
        let dispatcher = Dispatcher::new(Arc::new(MockBackend::new()));
        let before = dispatcher.view();

        dispatcher
            .dispatch(Signal::PredictUrlChanged {
                predict_url: "http://x/img.jpg".into(),
            })
            .await
            .unwrap();

        let after = dispatcher.view();
        assert_eq!(after.predict_url, "http://x/img.jpg");
        // no flags changed
        assert_eq!(after.status, before.status);
        assert_eq!(after.current_page, before.current_page);
    }

    #[tokio::test]
    async fn upload_completion_takes_the_first_url() {
        let dispatcher = Dispatcher::new(Arc::new(MockBackend::new()));

        let mut uploads = BTreeMap::new();
        uploads.insert(
            "a-cat.jpg".to_string(),
            synapse::signal::UploadedFile {
                upload_url: "http://cdn/a-cat.jpg".into(),
            },
        );
        uploads.insert(
            "b-dog.jpg".to_string(),
            synapse::signal::UploadedFile {
                upload_url: "http://cdn/b-dog.jpg".into(),
            },
        );

        dispatcher
            .dispatch(Signal::PredictUrlAdded { uploads })
            .await
            .unwrap();

        assert_eq!(dispatcher.view().predict_url, "http://cdn/a-cat.jpg");
    }

    #[tokio::test]
    async fn prediction_setup_signals_land_in_state() {
        let dispatcher = Dispatcher::new(Arc::new(MockBackend::new()));

        dispatcher
            .dispatch(Signal::BatchSizeChanged {
                batch_size: 8u32.try_into().unwrap(),
            })
            .await
            .unwrap();
        dispatcher
            .dispatch(Signal::DeviceChanged {
                device: Device::Cpu,
            })
            .await
            .unwrap();
        dispatcher
            .dispatch(Signal::PredictInputsSet {
                predict_inputs: vec!["upload://1".into(), "upload://2".into()],
            })
            .await
            .unwrap();
        dispatcher
            .dispatch(Signal::AgentChanged {
                agent_id: "10.0.0.4:8601".parse().unwrap(),
            })
            .await
            .unwrap();

        let view = dispatcher.view();
        assert_eq!(view.batch_size.get(), 8);
        assert_eq!(view.device, Device::Cpu);
        assert_eq!(view.predict_inputs.len(), 2);
        assert_eq!(view.selected_agent.unwrap().as_str(), "10.0.0.4:8601");
    }
}

// ============================================================================
// CATALOG CHAINS
// ============================================================================

mod catalog_chains {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn frameworks_routed_loads_catalog_and_agents() {
        let mxnet: ManifestKey = "mxnet:0.11".parse().unwrap();
        let backend = Arc::new(
            MockBackend::new()
                .with_frameworks(vec![framework("mxnet", "0.11"), framework("tf", "1.4")])
                .with_agents(&mxnet, vec![agent("10.0.0.4")]),
        );
        let dispatcher = Dispatcher::new(backend.clone());

        dispatcher.dispatch(Signal::FrameworksRouted).await.unwrap();

        let view = dispatcher.view();
        assert_eq!(view.current_page, Page::Frameworks);
        assert_eq!(view.name, "Synapse Frameworks");
        assert_eq!(view.frameworks.len(), 2);
        assert_eq!(view.frameworks[0].agents.len(), 1);
        assert_eq!(view.error, None);

        // flags are back down at completion
        assert!(!view.status.is_loading_framework_manifests);
        assert!(!view.status.is_loading_framework_agents);

        // manifests were loaded before agents were requested
        assert_eq!(
            backend.calls(),
            vec![
                "frameworks",
                "framework_agents mxnet:0.11",
                "framework_agents tf:1.4"
            ]
        );
    }

    #[tokio::test]
    async fn frameworks_routed_failure_stores_error_and_clears_flag() {
        let backend = Arc::new(
            MockBackend::new().with_failure(BackendError::Network("connection refused".into())),
        );
        let dispatcher = Dispatcher::new(backend);

        dispatcher.dispatch(Signal::FrameworksRouted).await.unwrap();

        let view = dispatcher.view();
        assert_eq!(view.current_page, Page::Frameworks);
        assert!(view.error.is_some());
        assert!(view.frameworks.is_empty());
        assert!(!view.status.is_loading_framework_manifests);
        assert!(!view.status.is_loading_framework_agents);

        let error = view.error.unwrap();
        assert!(error.message.contains("connection refused"));
    }

    #[tokio::test]
    async fn models_routed_loads_catalog() {
        let backend = Arc::new(
            MockBackend::new().with_models(vec![model("alexnet"), model("resnet50")]),
        );
        let dispatcher = Dispatcher::new(backend);

        dispatcher.dispatch(Signal::ModelsRouted).await.unwrap();

        let view = dispatcher.view();
        assert_eq!(view.current_page, Page::Models);
        assert_eq!(view.models.len(), 2);
        assert!(!view.status.is_loading_model_manifests);
        assert!(!view.status.is_loading_model_agents);
    }

    #[tokio::test]
    async fn model_informations_request_scoped_to_one_model() {
        let backend = Arc::new(
            MockBackend::new().with_models(vec![model("alexnet"), model("resnet50")]),
        );
        let dispatcher = Dispatcher::new(backend.clone());

        dispatcher
            .dispatch(Signal::ModelInformationsRequest {
                model_id: Some("alexnet".parse().unwrap()),
            })
            .await
            .unwrap();

        let view = dispatcher.view();
        // only the named manifest was fetched and stored
        assert_eq!(view.models.len(), 1);
        assert_eq!(view.models[0].name, "alexnet");
        assert!(!view.status.is_loading_model);
        assert_eq!(
            backend.calls(),
            vec!["model_manifest alexnet:latest", "model_agents alexnet:latest"]
        );
    }

    #[tokio::test]
    async fn agents_routed_honors_framework_filter() {
        let mxnet: ManifestKey = "mxnet:0.11".parse().unwrap();
        let backend = Arc::new(
            MockBackend::new()
                .with_frameworks(vec![framework("mxnet", "0.11"), framework("tf", "1.4")])
                .with_agents(&mxnet, vec![agent("10.0.0.4")]),
        );
        let dispatcher = Dispatcher::new(backend.clone());

        dispatcher
            .dispatch(Signal::AgentsRouted {
                framework_id: Some(mxnet),
            })
            .await
            .unwrap();

        assert_eq!(dispatcher.view().current_page, Page::Agents);
        // the filter narrowed the agents fetch to one framework
        assert_eq!(
            backend.calls(),
            vec!["frameworks", "framework_agents mxnet:0.11"]
        );
    }

    #[tokio::test]
    async fn agent_routed_selects_agent_and_fetches_manifest() {
        let backend = Arc::new(MockBackend::new().with_models(vec![model("alexnet")]));
        let dispatcher = Dispatcher::new(backend);

        dispatcher
            .dispatch(Signal::AgentRouted {
                agent_id: Some("10.0.0.4:8601".parse().unwrap()),
                model_id: Some("alexnet".parse().unwrap()),
            })
            .await
            .unwrap();

        let view = dispatcher.view();
        assert_eq!(view.current_page, Page::Agent);
        assert_eq!(view.selected_agent.unwrap().as_str(), "10.0.0.4:8601");
        assert_eq!(view.models.len(), 1);
        assert!(!view.status.is_loading_model);
    }

    #[tokio::test]
    async fn agent_routed_without_payload_skips_both_branches() {
        let backend = Arc::new(MockBackend::new());
        let dispatcher = Dispatcher::new(backend.clone());

        dispatcher
            .dispatch(Signal::AgentRouted {
                agent_id: None,
                model_id: None,
            })
            .await
            .unwrap();

        assert_eq!(dispatcher.view().current_page, Page::Agent);
        assert_eq!(dispatcher.view().selected_agent, None);
        assert!(backend.calls().is_empty());
    }
}

// ============================================================================
// INFERENCE CHAIN
// ============================================================================

mod inference_chain {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn successful_prediction_stores_results() {
        let backend = Arc::new(MockBackend::new().with_predictions(tabby_response()));
        let dispatcher = Dispatcher::new(backend.clone());

        dispatcher
            .dispatch(Signal::PredictUrlChanged {
                predict_url: "http://x/img.jpg".into(),
            })
            .await
            .unwrap();
        dispatcher
            .dispatch(Signal::InferenceButtonClicked {
                selected_models: selection(&["alexnet:latest"]),
            })
            .await
            .unwrap();

        let view = dispatcher.view();
        assert_eq!(view.predictions.len(), 2);
        assert_eq!(view.predictions[0].label, "tabby cat");
        assert!(!view.status.is_predicting);
        assert_eq!(view.error, None);

        let request = backend.last_infer_request().unwrap();
        assert_eq!(request.models[0].name, "alexnet");
    }

    #[tokio::test]
    async fn predicting_flag_goes_up_then_down() {
        let backend = Arc::new(
            MockBackend::new()
                .with_predictions(tabby_response())
                .with_latency(Duration::from_millis(10)),
        );
        let dispatcher = Dispatcher::new(backend);
        let mut receiver = dispatcher.subscribe();

        dispatcher
            .dispatch(Signal::PredictUrlChanged {
                predict_url: "http://x/img.jpg".into(),
            })
            .await
            .unwrap();

        let handle = dispatcher.spawn(Signal::InferenceButtonClicked {
            selected_models: selection(&["alexnet:latest"]),
        });

        let mut saw_predicting = false;
        loop {
            receiver.changed().await.unwrap();
            let view = receiver.borrow_and_update().clone();
            if view.status.is_predicting {
                saw_predicting = true;
            }
            if !view.predictions.is_empty() {
                break;
            }
        }
        handle.await.unwrap();

        assert!(saw_predicting, "the flag should be visible while in flight");
        assert!(!dispatcher.view().status.is_predicting);
    }

    #[tokio::test]
    async fn empty_selection_never_predicts() {
        let backend = Arc::new(MockBackend::new());
        let dispatcher = Dispatcher::new(backend.clone());

        dispatcher
            .dispatch(Signal::InferenceButtonClicked {
                selected_models: BTreeMap::new(),
            })
            .await
            .unwrap();

        let view = dispatcher.view();
        assert!(!view.status.is_predicting);
        assert!(view.error.is_some());
        assert_eq!(view.predictions.len(), 0);
        // the guard fired before any backend traffic
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn all_false_selection_fails_preflight_without_raising_the_flag() {
        let backend = Arc::new(MockBackend::new());
        let dispatcher = Dispatcher::new(backend.clone());

        let mut selected_models = BTreeMap::new();
        selected_models.insert("alexnet:latest".to_string(), false);

        dispatcher
            .dispatch(Signal::InferenceButtonClicked { selected_models })
            .await
            .unwrap();

        let view = dispatcher.view();
        assert!(!view.status.is_predicting);
        assert!(view.error.is_some());
        assert!(backend.calls().is_empty());

        // preflight rejection is visible in the trail
        let failed = dispatcher
            .events()
            .events()
            .into_iter()
            .any(|e| matches!(e.kind, EventKind::ActionFailed { .. }));
        assert!(failed);
    }

    #[tokio::test]
    async fn backend_failure_surfaces_error_and_clears_flag() {
        let backend = Arc::new(
            MockBackend::new().with_failure(BackendError::Api {
                name: "Predict".into(),
                message: "all agents busy".into(),
                code: 503,
            }),
        );
        let dispatcher = Dispatcher::new(backend);

        dispatcher
            .dispatch(Signal::PredictUrlChanged {
                predict_url: "http://x/img.jpg".into(),
            })
            .await
            .unwrap();
        dispatcher
            .dispatch(Signal::InferenceButtonClicked {
                selected_models: selection(&["alexnet:latest"]),
            })
            .await
            .unwrap();

        let view = dispatcher.view();
        assert!(!view.status.is_predicting);
        let error = view.error.unwrap();
        assert_eq!(error.name, "Predict");
        assert_eq!(error.code, Some(503));
        assert!(view.predictions.is_empty());
    }

    #[tokio::test]
    async fn selection_lands_in_state_alongside_the_results() {
        let backend = Arc::new(MockBackend::new().with_predictions(tabby_response()));
        let dispatcher = Dispatcher::new(backend);

        dispatcher
            .dispatch(Signal::PredictUrlChanged {
                predict_url: "http://x/img.jpg".into(),
            })
            .await
            .unwrap();
        dispatcher
            .dispatch(Signal::InferenceButtonClicked {
                selected_models: selection(&["alexnet:latest", "resnet50:latest"]),
            })
            .await
            .unwrap();

        let view = dispatcher.view();
        assert_eq!(view.selected_models.len(), 2);
        assert!(view.selected_models.contains("alexnet:latest"));
    }
}

// ============================================================================
// CONCURRENCY
// ============================================================================

mod concurrency {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn field_edits_interleave_with_pending_fetches() {
        let backend = Arc::new(
            MockBackend::new()
                .with_frameworks(vec![framework("mxnet", "0.11")])
                .with_latency(Duration::from_millis(20)),
        );
        let dispatcher = Dispatcher::new(backend);

        let fetch = dispatcher.spawn(Signal::FrameworksRouted);

        // give the fetch a chance to raise its flag and suspend
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(dispatcher.view().status.is_loading_framework_manifests);

        // an unrelated trigger is processed while the fetch is pending
        dispatcher
            .dispatch(Signal::DeviceChanged {
                device: Device::Cpu,
            })
            .await
            .unwrap();
        assert_eq!(dispatcher.view().device, Device::Cpu);
        assert!(dispatcher.view().status.is_loading_framework_manifests);

        fetch.await.unwrap();
        let view = dispatcher.view();
        assert_eq!(view.device, Device::Cpu);
        assert_eq!(view.frameworks.len(), 1);
        assert!(!view.status.any_loading());
    }

    #[tokio::test]
    async fn overlapping_device_changes_last_write_wins() {
        let dispatcher = Dispatcher::new(Arc::new(MockBackend::new()));

        let first = dispatcher.spawn(Signal::DeviceChanged {
            device: Device::Cpu,
        });
        let second = dispatcher.spawn(Signal::DeviceChanged {
            device: Device::Gpu,
        });

        first.await.unwrap();
        second.await.unwrap();

        assert_eq!(dispatcher.view().device, Device::Gpu);
    }

    #[tokio::test]
    async fn failed_execution_does_not_poison_the_dispatcher() {
        let backend = Arc::new(
            MockBackend::new().with_failure(BackendError::Network("connection refused".into())),
        );
        let dispatcher = Dispatcher::new(backend.clone());

        dispatcher.dispatch(Signal::FrameworksRouted).await.unwrap();
        assert!(dispatcher.view().error.is_some());

        // the backend recovers; a later dispatch starts clean
        backend.set_failure(None);
        dispatcher.dispatch(Signal::HomeRouted).await.unwrap();
        assert_eq!(dispatcher.view().error, None);

        dispatcher.dispatch(Signal::FrameworksRouted).await.unwrap();
        assert_eq!(dispatcher.view().error, None);
    }
}

// ============================================================================
// EVENT TRAIL
// ============================================================================

mod event_trail {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn chain_lifecycle_is_recorded() {
        let dispatcher = Dispatcher::new(Arc::new(MockBackend::new()));
        dispatcher.dispatch(Signal::FrameworksRouted).await.unwrap();

        let events = dispatcher.events().filter_signal("frameworksRouted");
        assert!(matches!(
            events.first().unwrap().kind,
            EventKind::SignalDispatched { .. }
        ));
        assert!(matches!(
            events.last().unwrap().kind,
            EventKind::ChainCompleted { .. }
        ));

        let actions: Vec<_> = events
            .iter()
            .filter(|e| matches!(e.kind, EventKind::ActionStarted { .. }))
            .collect();
        assert_eq!(actions.len(), 2, "frameworks fetch then agents fetch");
    }

    #[tokio::test]
    async fn versions_in_the_trail_are_monotonic() {
        let dispatcher = Dispatcher::new(Arc::new(
            MockBackend::new().with_frameworks(vec![framework("tf", "1.4")]),
        ));
        dispatcher.dispatch(Signal::AppLoaded).await.unwrap();
        dispatcher.dispatch(Signal::FrameworksRouted).await.unwrap();

        let versions: Vec<u64> = dispatcher
            .events()
            .events()
            .into_iter()
            .filter_map(|e| match e.kind {
                EventKind::BatchCommitted { version, .. } => Some(version),
                _ => None,
            })
            .collect();
        assert!(versions.windows(2).all(|pair| pair[0] <= pair[1]));
        assert!(!versions.is_empty());
    }
}

// ============================================================================
// SCENARIO: full console session
// ============================================================================

#[tokio::test]
async fn full_session_against_the_mock_backend() {
    let mxnet: ManifestKey = "mxnet:0.11".parse().unwrap();
    let backend = Arc::new(
        MockBackend::new()
            .with_frameworks(vec![framework("mxnet", "0.11")])
            .with_agents(&mxnet, vec![agent("10.0.0.4")])
            .with_models(vec![model("alexnet")])
            .with_predictions(tabby_response()),
    );
    let dispatcher = Dispatcher::new(backend);

    dispatcher.dispatch(Signal::AppLoaded).await.unwrap();
    dispatcher.dispatch(Signal::FrameworksRouted).await.unwrap();
    dispatcher.dispatch(Signal::ModelsRouted).await.unwrap();
    dispatcher
        .dispatch(Signal::PredictUrlChanged {
            predict_url: "http://x/img.jpg".into(),
        })
        .await
        .unwrap();
    dispatcher
        .dispatch(Signal::InferenceButtonClicked {
            selected_models: selection(&["alexnet:latest"]),
        })
        .await
        .unwrap();
    dispatcher.dispatch(Signal::HomeRouted).await.unwrap();

    let view = dispatcher.view();
    assert!(view.status.is_loaded);
    assert_eq!(view.current_page, Page::Home);
    assert_eq!(view.frameworks.len(), 1);
    assert_eq!(view.models.len(), 1);
    assert_eq!(view.predictions.len(), 2);
    assert_eq!(view.error, None);
    assert!(!view.is_busy());

    // state serializes with the wire names the components bind to
    let snapshot = serde_json::to_value(dispatcher.state_snapshot()).unwrap();
    assert_eq!(snapshot["predictURL"], "http://x/img.jpg");
    assert_eq!(snapshot["status"]["isPredicting"], false);
    assert_eq!(snapshot["name"], json!("Synapse"));
}
