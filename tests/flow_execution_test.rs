//! End-to-end flow execution through the service and engine

mod common;

use std::collections::HashMap;

use pretty_assertions::assert_eq;

use common::{harness, script_executor};
use thunder::application::Application;
use thunder::engine::service::{FlowExecutionRequest, FlowServiceError};
use thunder::executor::{ExecutorConfig, ExecutorRegistry, ExecutorResponse};
use thunder::flow::{
    AuthenticatedUser, FlowStatus, FlowType, InputDescriptor, NodeResponseStatus, StepType,
};
use thunder::graph::GraphBuilder;
use thunder::store::FlowContextStore;

fn app(graph_id: &str) -> Application {
    Application::new("app-1", "storefront").with_auth_graph(graph_id)
}

/// Start-to-terminal single task: COMPLETE with an assertion, nothing
/// persisted.
#[tokio::test]
async fn test_single_task_flow_completes() {
    let registry = ExecutorRegistry::new();
    script_executor(
        &registry,
        "assert",
        vec![ExecutorResponse {
            status: NodeResponseStatus::Complete,
            assertion: Some("A".to_string()),
            ..ExecutorResponse::default()
        }],
    );

    let graph = GraphBuilder::new("auth_single", FlowType::Authentication)
        .task_node("finish", ExecutorConfig::named("assert"))
        .start("finish")
        .build()
        .unwrap();

    let h = harness(vec![graph], vec![app("auth_single")], registry).await;
    let step = h
        .service
        .execute(FlowExecutionRequest::new("app-1", FlowType::Authentication))
        .await
        .unwrap();

    assert_eq!(step.status, FlowStatus::Complete);
    assert_eq!(step.assertion.as_deref(), Some("A"));
    assert!(step.step_type.is_none());
    assert!(h.contexts.is_empty());
}

/// Prompt then complete across two turns; intermediate state is persisted
/// at the prompting node and deleted on completion.
#[tokio::test]
async fn test_prompt_then_complete() {
    let registry = ExecutorRegistry::new();
    script_executor(
        &registry,
        "collect",
        vec![
            ExecutorResponse::prompt(vec![InputDescriptor::required("username")]),
            ExecutorResponse {
                status: NodeResponseStatus::Complete,
                runtime_data: HashMap::from([("step1".to_string(), "done".to_string())]),
                ..ExecutorResponse::default()
            },
        ],
    );
    script_executor(&registry, "finish", vec![ExecutorResponse::complete()]);

    let graph = GraphBuilder::new("auth_two", FlowType::Authentication)
        .task_node("n1", ExecutorConfig::named("collect"))
        .task_node("n2", ExecutorConfig::named("finish"))
        .edge("n1", "n2")
        .start("n1")
        .build()
        .unwrap();

    let h = harness(vec![graph], vec![app("auth_two")], registry).await;

    let first = h
        .service
        .execute(FlowExecutionRequest::new("app-1", FlowType::Authentication))
        .await
        .unwrap();
    assert_eq!(first.status, FlowStatus::Incomplete);
    assert_eq!(first.step_type, Some(StepType::View));
    assert_eq!(first.data.inputs.len(), 1);
    assert_eq!(first.data.inputs[0].name, "username");
    assert!(!first.flow_id.is_empty());

    let record = h.contexts.get(&first.flow_id).await.unwrap().unwrap();
    assert_eq!(record.current_node_id.as_deref(), Some("n1"));
    assert_eq!(record.graph_id, "auth_two");

    let second = h
        .service
        .execute(
            FlowExecutionRequest::new("app-1", FlowType::Authentication)
                .with_flow_id(first.flow_id.clone())
                .with_input("username", "u"),
        )
        .await
        .unwrap();
    assert_eq!(second.status, FlowStatus::Complete);
    // Runtime data history is engine-internal; the step exposes none of it.
    assert!(second.data.inputs.is_empty());
    assert!(second.data.additional_data.is_empty());
    assert!(h.contexts.is_empty());
}

/// Redirection suspends the flow with the URL, merged additional data, and
/// the follow-up inputs.
#[tokio::test]
async fn test_redirection_step() {
    let registry = ExecutorRegistry::new();
    let mut redirect = ExecutorResponse::redirect("https://idp/x");
    redirect.additional_data = HashMap::from([("state".to_string(), "s".to_string())]);
    redirect.required_data = vec![InputDescriptor::optional("code")];
    script_executor(&registry, "idp", vec![redirect]);

    let graph = GraphBuilder::new("auth_idp", FlowType::Authentication)
        .task_node("redirect", ExecutorConfig::named("idp"))
        .start("redirect")
        .build()
        .unwrap();

    let h = harness(vec![graph], vec![app("auth_idp")], registry).await;
    let step = h
        .service
        .execute(FlowExecutionRequest::new("app-1", FlowType::Authentication))
        .await
        .unwrap();

    assert_eq!(step.status, FlowStatus::Incomplete);
    assert_eq!(step.step_type, Some(StepType::Redirection));
    assert_eq!(step.data.redirect_url.as_deref(), Some("https://idp/x"));
    assert_eq!(
        step.data.additional_data.get("state").map(String::as_str),
        Some("s")
    );
    assert_eq!(step.data.inputs.len(), 1);
    assert_eq!(step.data.inputs[0].name, "code");
    assert_eq!(h.contexts.len(), 1);
}

/// Decision nodes prompt with their successors, then branch on the chosen
/// action.
#[tokio::test]
async fn test_decision_branch() {
    let registry = ExecutorRegistry::new();
    script_executor(
        &registry,
        "password",
        vec![ExecutorResponse {
            status: NodeResponseStatus::Complete,
            assertion: Some("via-password".to_string()),
            ..ExecutorResponse::default()
        }],
    );
    script_executor(
        &registry,
        "otp",
        vec![ExecutorResponse {
            status: NodeResponseStatus::Complete,
            assertion: Some("via-otp".to_string()),
            ..ExecutorResponse::default()
        }],
    );

    let graph = GraphBuilder::new("auth_choice", FlowType::Authentication)
        .decision_node("choose")
        .task_node("password", ExecutorConfig::named("password"))
        .task_node("otp", ExecutorConfig::named("otp"))
        .edge("choose", "password")
        .edge("choose", "otp")
        .start("choose")
        .build()
        .unwrap();

    let h = harness(vec![graph], vec![app("auth_choice")], registry).await;

    let first = h
        .service
        .execute(FlowExecutionRequest::new("app-1", FlowType::Authentication))
        .await
        .unwrap();
    assert_eq!(first.status, FlowStatus::Incomplete);
    assert_eq!(first.step_type, Some(StepType::View));
    let actions: Vec<_> = first.data.actions.iter().map(|a| a.id.as_str()).collect();
    assert_eq!(actions, vec!["password", "otp"]);

    let second = h
        .service
        .execute(
            FlowExecutionRequest::new("app-1", FlowType::Authentication)
                .with_flow_id(first.flow_id.clone())
                .with_action("otp"),
        )
        .await
        .unwrap();
    assert_eq!(second.status, FlowStatus::Complete);
    assert_eq!(second.assertion.as_deref(), Some("via-otp"));
    assert!(h.contexts.is_empty());
}

/// An action naming no successor is a node error; the persisted context is
/// discarded so the client must restart.
#[tokio::test]
async fn test_decision_unknown_action_discards_context() {
    let registry = ExecutorRegistry::new();
    script_executor(&registry, "password", vec![ExecutorResponse::complete()]);

    let graph = GraphBuilder::new("auth_choice", FlowType::Authentication)
        .decision_node("choose")
        .task_node("password", ExecutorConfig::named("password"))
        .edge("choose", "password")
        .start("choose")
        .build()
        .unwrap();

    let h = harness(vec![graph], vec![app("auth_choice")], registry).await;

    let first = h
        .service
        .execute(FlowExecutionRequest::new("app-1", FlowType::Authentication))
        .await
        .unwrap();
    assert_eq!(h.contexts.len(), 1);

    let err = h
        .service
        .execute(
            FlowExecutionRequest::new("app-1", FlowType::Authentication)
                .with_flow_id(first.flow_id.clone())
                .with_action("magic-link"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, FlowServiceError::Engine(_)));
    assert!(h.contexts.is_empty());

    // The discarded flow id no longer resumes.
    let err = h
        .service
        .execute(
            FlowExecutionRequest::new("app-1", FlowType::Authentication)
                .with_flow_id(first.flow_id),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, FlowServiceError::InvalidFlowId(_)));
}

/// A FAILURE response surfaces as an ERROR step and erases persisted
/// state.
#[tokio::test]
async fn test_failure_erases_state() {
    let registry = ExecutorRegistry::new();
    script_executor(
        &registry,
        "login",
        vec![
            ExecutorResponse::prompt(vec![InputDescriptor::required("password")]),
            ExecutorResponse::failure("wrong pw"),
        ],
    );

    let graph = GraphBuilder::new("auth_pw", FlowType::Authentication)
        .task_node("login", ExecutorConfig::named("login"))
        .start("login")
        .build()
        .unwrap();

    let h = harness(vec![graph], vec![app("auth_pw")], registry).await;

    let first = h
        .service
        .execute(FlowExecutionRequest::new("app-1", FlowType::Authentication))
        .await
        .unwrap();
    assert_eq!(h.contexts.len(), 1);

    let second = h
        .service
        .execute(
            FlowExecutionRequest::new("app-1", FlowType::Authentication)
                .with_flow_id(first.flow_id)
                .with_input("password", "nope"),
        )
        .await
        .unwrap();
    assert_eq!(second.status, FlowStatus::Error);
    assert_eq!(second.failure_reason.as_deref(), Some("wrong pw"));
    assert!(h.contexts.is_empty());
}

/// A brand-new flow that fails is never persisted.
#[tokio::test]
async fn test_new_flow_failure_not_persisted() {
    let registry = ExecutorRegistry::new();
    script_executor(
        &registry,
        "login",
        vec![ExecutorResponse::failure("locked out")],
    );

    let graph = GraphBuilder::new("auth_pw", FlowType::Authentication)
        .task_node("login", ExecutorConfig::named("login"))
        .start("login")
        .build()
        .unwrap();

    let h = harness(vec![graph], vec![app("auth_pw")], registry).await;
    let step = h
        .service
        .execute(FlowExecutionRequest::new("app-1", FlowType::Authentication))
        .await
        .unwrap();

    assert_eq!(step.status, FlowStatus::Error);
    assert!(h.contexts.is_empty());
}

/// Identity established mid-flow survives suspension and reaches the
/// assertion executor on a later turn.
#[tokio::test]
async fn test_identity_persists_across_turns() {
    let registry = ExecutorRegistry::new();
    script_executor(
        &registry,
        "authenticate",
        vec![
            ExecutorResponse::prompt(vec![InputDescriptor::required("password")]),
            ExecutorResponse {
                status: NodeResponseStatus::Complete,
                authenticated_user: Some(AuthenticatedUser {
                    is_authenticated: true,
                    user_id: "u-42".to_string(),
                    attributes: HashMap::from([(
                        "email".to_string(),
                        "alice@example.com".to_string(),
                    )]),
                }),
                ..ExecutorResponse::default()
            },
        ],
    );
    script_executor(
        &registry,
        "confirm",
        vec![
            ExecutorResponse::prompt(vec![InputDescriptor::required("consent")]),
            ExecutorResponse {
                status: NodeResponseStatus::Complete,
                assertion: Some("token".to_string()),
                ..ExecutorResponse::default()
            },
        ],
    );

    let graph = GraphBuilder::new("auth_full", FlowType::Authentication)
        .task_node("authenticate", ExecutorConfig::named("authenticate"))
        .task_node("confirm", ExecutorConfig::named("confirm"))
        .edge("authenticate", "confirm")
        .start("authenticate")
        .build()
        .unwrap();

    let h = harness(vec![graph], vec![app("auth_full")], registry).await;

    let first = h
        .service
        .execute(FlowExecutionRequest::new("app-1", FlowType::Authentication))
        .await
        .unwrap();

    // Turn two: authentication completes, the confirm node prompts.
    let second = h
        .service
        .execute(
            FlowExecutionRequest::new("app-1", FlowType::Authentication)
                .with_flow_id(first.flow_id.clone())
                .with_input("password", "s3cret"),
        )
        .await
        .unwrap();
    assert_eq!(second.status, FlowStatus::Incomplete);

    let record = h.contexts.get(&first.flow_id).await.unwrap().unwrap();
    assert!(record.is_authenticated);
    assert_eq!(record.user_id.as_deref(), Some("u-42"));
    assert_eq!(
        record.runtime_data.get("userID").map(String::as_str),
        Some("u-42")
    );
    assert_eq!(
        record.user_attributes.get("email").map(String::as_str),
        Some("alice@example.com")
    );

    let third = h
        .service
        .execute(
            FlowExecutionRequest::new("app-1", FlowType::Authentication)
                .with_flow_id(first.flow_id)
                .with_input("consent", "yes"),
        )
        .await
        .unwrap();
    assert_eq!(third.status, FlowStatus::Complete);
    assert_eq!(third.assertion.as_deref(), Some("token"));
    assert!(h.contexts.is_empty());
}

#[tokio::test]
async fn test_invalid_flow_type_rejected() {
    let h = harness(vec![], vec![], ExecutorRegistry::new()).await;
    let err = h
        .service
        .execute(FlowExecutionRequest {
            app_id: "app-1".to_string(),
            flow_type: "PASSWORD_RESET".to_string(),
            ..FlowExecutionRequest::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, FlowServiceError::InvalidFlowType(t) if t == "PASSWORD_RESET"));
}

#[tokio::test]
async fn test_unknown_application_rejected() {
    let h = harness(vec![], vec![], ExecutorRegistry::new()).await;
    let err = h
        .service
        .execute(FlowExecutionRequest::new("ghost", FlowType::Authentication))
        .await
        .unwrap_err();
    assert!(matches!(err, FlowServiceError::ApplicationNotFound(id) if id == "ghost"));
}

#[tokio::test]
async fn test_unknown_flow_id_rejected() {
    let h = harness(vec![], vec![], ExecutorRegistry::new()).await;
    let err = h
        .service
        .execute(
            FlowExecutionRequest::new("app-1", FlowType::Authentication)
                .with_flow_id("f-nonexistent"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, FlowServiceError::InvalidFlowId(id) if id == "f-nonexistent"));
}

#[tokio::test]
async fn test_registration_gating() {
    let mut no_registration = Application::new("app-1", "storefront").with_auth_graph("auth");
    no_registration.is_registration_flow_enabled = false;

    let h = harness(vec![], vec![no_registration], ExecutorRegistry::new()).await;
    let err = h
        .service
        .execute(FlowExecutionRequest::new("app-1", FlowType::Registration))
        .await
        .unwrap_err();
    assert!(matches!(err, FlowServiceError::RegistrationDisabled(_)));
}

#[tokio::test]
async fn test_registration_enabled_without_graph() {
    let mut app = Application::new("app-1", "storefront");
    app.is_registration_flow_enabled = true;

    let h = harness(vec![], vec![app], ExecutorRegistry::new()).await;
    let err = h
        .service
        .execute(FlowExecutionRequest::new("app-1", FlowType::Registration))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        FlowServiceError::RegistrationGraphNotConfigured(_)
    ));
}

#[tokio::test]
async fn test_auth_graph_not_configured() {
    let app = Application::new("app-1", "storefront");
    let h = harness(vec![], vec![app], ExecutorRegistry::new()).await;
    let err = h
        .service
        .execute(FlowExecutionRequest::new("app-1", FlowType::Authentication))
        .await
        .unwrap_err();
    assert!(matches!(err, FlowServiceError::AuthGraphNotConfigured(_)));
}

#[tokio::test]
async fn test_unregistered_graph_rejected() {
    let app = Application::new("app-1", "storefront").with_auth_graph("not-registered");
    let h = harness(vec![], vec![app], ExecutorRegistry::new()).await;
    let err = h
        .service
        .execute(FlowExecutionRequest::new("app-1", FlowType::Authentication))
        .await
        .unwrap_err();
    assert!(matches!(err, FlowServiceError::GraphNotFound(id) if id == "not-registered"));
}

/// An unknown executor name fails flow construction with a dedicated
/// error.
#[tokio::test]
async fn test_unknown_executor_fails_dispatch() {
    let graph = GraphBuilder::new("auth", FlowType::Authentication)
        .task_node("login", ExecutorConfig::named("never-registered"))
        .start("login")
        .build()
        .unwrap();

    let h = harness(vec![graph], vec![app("auth")], ExecutorRegistry::new()).await;
    let err = h
        .service
        .execute(FlowExecutionRequest::new("app-1", FlowType::Authentication))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        FlowServiceError::Engine(thunder::engine::EngineError::ConstructingNodeExecutor { .. })
    ));
    assert!(h.contexts.is_empty());
}
