//! Property-based invariants of the engine and stores

mod common;

use std::collections::HashMap;
use std::sync::Arc;

use proptest::prelude::*;

use common::script_executor;
use thunder::engine::{EngineContext, FlowEngine};
use thunder::executor::{ExecutorConfig, ExecutorRegistry, ExecutorResponse};
use thunder::flow::{AuthenticatedUser, FlowType, NodeResponseStatus};
use thunder::graph::GraphBuilder;
use thunder::resource::{
    CompositeResourceStore, FileResourceStore, MemoryResourceStore, Resource, ResourceStore,
    UserSchema,
};
use thunder::store::{deserialize_map, serialize_map};

fn small_map() -> impl Strategy<Value = HashMap<String, String>> {
    prop::collection::hash_map("[a-z]{1,8}", "[a-z0-9]{0,8}", 0..8)
}

fn id_set() -> impl Strategy<Value = Vec<String>> {
    prop::collection::btree_set("[a-d][0-9]", 0..8).prop_map(|set| set.into_iter().collect())
}

/// Run a linear chain of task nodes, each completing with one of the given
/// runtime-data maps, and return the step plus the final context.
async fn run_chain(
    initial_runtime: HashMap<String, String>,
    responses: Vec<HashMap<String, String>>,
) -> (thunder::flow::FlowStep, EngineContext) {
    let registry = ExecutorRegistry::new();
    let scripted: Vec<ExecutorResponse> = responses
        .iter()
        .map(|runtime_data| ExecutorResponse {
            status: NodeResponseStatus::Complete,
            runtime_data: runtime_data.clone(),
            ..ExecutorResponse::default()
        })
        .collect();
    script_executor(&registry, "chain", scripted);

    let count = responses.len().max(1);
    let mut builder = GraphBuilder::new("chain", FlowType::Authentication);
    for i in 0..count {
        builder = builder.task_node(format!("n{i}"), ExecutorConfig::named("chain"));
    }
    for i in 1..count {
        builder = builder.edge(format!("n{}", i - 1), format!("n{i}"));
    }
    let graph = builder.start("n0").build().unwrap();

    let engine = FlowEngine::new(Arc::new(registry));
    let mut ctx = EngineContext::new("flow-1", "app-1", FlowType::Authentication);
    ctx.graph = Some(Arc::new(graph));
    ctx.runtime_data = initial_runtime;

    let step = engine.execute(&mut ctx).await.unwrap();
    (step, ctx)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Two runs over equal state and equal responses produce equal steps
    /// and equal final contexts.
    #[test]
    fn prop_execution_is_deterministic(
        initial in small_map(),
        responses in prop::collection::vec(small_map(), 1..5),
    ) {
        tokio_test::block_on(async {
            let (step_a, ctx_a) = run_chain(initial.clone(), responses.clone()).await;
            let (step_b, ctx_b) = run_chain(initial, responses).await;

            assert_eq!(step_a, step_b);
            assert_eq!(ctx_a.runtime_data, ctx_b.runtime_data);
            assert_eq!(ctx_a.user_input_data, ctx_b.user_input_data);
            assert_eq!(ctx_a.authenticated_user, ctx_b.authenticated_user);
            assert_eq!(ctx_a.current_node.is_none(), ctx_b.current_node.is_none());
        });
    }

    /// Runtime data keys only grow; values follow the latest writer.
    #[test]
    fn prop_runtime_data_is_monotonic(
        initial in small_map(),
        responses in prop::collection::vec(small_map(), 1..5),
    ) {
        tokio_test::block_on(async {
            let (_, ctx) = run_chain(initial.clone(), responses.clone()).await;

            let mut expected = initial;
            for response in responses {
                expected.extend(response);
            }
            assert_eq!(ctx.runtime_data, expected);
        });
    }

    /// Attribute merge keeps every prior key and lets new values win.
    #[test]
    fn prop_attribute_merge_precedence(prior in small_map(), new in small_map()) {
        tokio_test::block_on(async {
            let registry = ExecutorRegistry::new();
            script_executor(
                &registry,
                "enrich",
                vec![ExecutorResponse {
                    status: NodeResponseStatus::Complete,
                    authenticated_user: Some(AuthenticatedUser {
                        is_authenticated: true,
                        user_id: "u-1".to_string(),
                        attributes: new.clone(),
                    }),
                    ..ExecutorResponse::default()
                }],
            );
            let graph = GraphBuilder::new("g", FlowType::Authentication)
                .task_node("enrich", ExecutorConfig::named("enrich"))
                .start("enrich")
                .build()
                .unwrap();

            let engine = FlowEngine::new(Arc::new(registry));
            let mut ctx = EngineContext::new("flow-1", "app-1", FlowType::Authentication);
            ctx.graph = Some(Arc::new(graph));
            ctx.authenticated_user.attributes = prior.clone();

            engine.execute(&mut ctx).await.unwrap();

            let mut expected = prior;
            expected.extend(new);
            assert_eq!(ctx.authenticated_user.attributes, expected);
        });
    }

    /// The composite merge yields exactly one entry per id, database
    /// entries first and winning collisions, read-only tracking the
    /// source.
    #[test]
    fn prop_composite_dedup(db_ids in id_set(), file_ids in id_set()) {
        tokio_test::block_on(async {
            let file = Arc::new(FileResourceStore::new());
            for id in &file_ids {
                file.register(UserSchema::new(id.clone(), "file", serde_json::json!({})))
                    .unwrap();
            }
            let db = Arc::new(MemoryResourceStore::new());
            for id in &db_ids {
                db.create(UserSchema::new(id.clone(), "db", serde_json::json!({})))
                    .await
                    .unwrap();
            }

            let store = CompositeResourceStore::new(file, db);
            let listed = store.list().await.unwrap();

            // One entry per unique id.
            let mut ids: Vec<&str> = listed.iter().map(|r| r.id()).collect();
            ids.sort_unstable();
            ids.dedup();
            assert_eq!(ids.len(), listed.len());

            for resource in &listed {
                let in_db = db_ids.iter().any(|id| id == resource.id());
                if in_db {
                    assert_eq!(resource.name(), "db");
                    assert!(!resource.is_read_only());
                } else {
                    assert_eq!(resource.name(), "file");
                    assert!(resource.is_read_only());
                }
            }

            // Database entries precede file entries.
            let first_file_index = listed.iter().position(|r| r.is_read_only());
            if let Some(boundary) = first_file_index {
                assert!(listed[boundary..].iter().all(|r| r.is_read_only()));
            }
        });
    }

    /// Context maps survive canonical serialization unchanged.
    #[test]
    fn prop_map_serialization_round_trips(map in small_map()) {
        let text = serialize_map(&map).unwrap();
        let restored = deserialize_map(text.as_deref()).unwrap();
        assert_eq!(restored, map);

        // Canonical form is stable across identical inputs.
        assert_eq!(text, serialize_map(&map).unwrap());
    }
}
