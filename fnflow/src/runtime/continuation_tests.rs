//! Tests for the continuation registry and invoker.

#[cfg(test)]
mod tests {
    use crate::completer::{InvokeStageRequest, MockCompleterClient};
    use crate::context;
    use crate::core::{CompletionResult, Datum, ErrorType, FlowId, FlowState, StageId};
    use crate::errors::FlowError;
    use crate::flow::{Closure, Flow, FlowFuture, CAPTURED_ENTRY};
    use crate::runtime::{ContinuationInvoker, ContinuationKind, ContinuationRegistry};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn invoker(registry: ContinuationRegistry) -> ContinuationInvoker {
        ContinuationInvoker::new(Arc::new(registry), Arc::new(MockCompleterClient::new()))
    }

    fn request(closure: Closure, args: Vec<CompletionResult>) -> InvokeStageRequest {
        InvokeStageRequest {
            flow_id: FlowId::new("f"),
            stage_id: StageId::new("1"),
            closure,
            args,
        }
    }

    fn value<T: serde::Serialize>(v: &T) -> CompletionResult {
        CompletionResult::success(Datum::json(v).unwrap())
    }

    fn error_type(result: &CompletionResult) -> ErrorType {
        result.datum().as_error().unwrap().error_type
    }

    #[test]
    fn test_builtin_entry_registered() {
        let registry = ContinuationRegistry::new();
        assert!(registry.contains(CAPTURED_ENTRY));
        assert_eq!(registry.kind(CAPTURED_ENTRY), Some(ContinuationKind::Function));
    }

    #[tokio::test]
    async fn test_supplier_and_function() {
        let registry = ContinuationRegistry::new();
        registry.register_supplier("parse", |input: String| async move { Ok(input.parse::<i64>()?) });
        registry.register_function("add", |n: i64, v: i64| async move { Ok(v + n) });
        let invoker = invoker(registry);

        let parsed = invoker
            .invoke(request(Closure::with_captured("parse", &"39").unwrap(), vec![]))
            .await;
        assert_eq!(parsed.result, value(&39_i64));

        let added = invoker
            .invoke(request(Closure::with_captured("add", &3).unwrap(), vec![parsed.result]))
            .await;
        assert_eq!(added.result.datum().decode::<i64>().unwrap(), 42);
    }

    #[tokio::test]
    async fn test_body_error_becomes_user_error() {
        let registry = ContinuationRegistry::new();
        registry.register_supplier("parse", |input: String| async move { Ok(input.parse::<i64>()?) });

        let response = invoker(registry)
            .invoke(request(Closure::with_captured("parse", &"abc").unwrap(), vec![]))
            .await;
        assert!(response.result.is_failure());
        assert_eq!(error_type(&response.result), ErrorType::UserError);
    }

    #[tokio::test]
    async fn test_reraised_failure_keeps_datum() {
        let original = Datum::error(ErrorType::FunctionTimeout, "upstream");
        let registry = ContinuationRegistry::new();
        let raised = original.clone();
        registry.register_supplier("rethrow", move |(): ()| {
            let raised = raised.clone();
            async move { Err::<(), _>(crate::bridge::bridge(raised).into()) }
        });

        let response = invoker(registry)
            .invoke(request(Closure::new("rethrow"), vec![]))
            .await;
        assert_eq!(response.result, CompletionResult::failure(original));
    }

    #[tokio::test]
    async fn test_unknown_entry_and_arity_mismatch() {
        let registry = ContinuationRegistry::new();
        registry.register_function("double", |(): (), v: i64| async move { Ok(v * 2) });
        let invoker = invoker(registry);

        let unknown = invoker.invoke(request(Closure::new("missing"), vec![])).await;
        assert_eq!(error_type(&unknown.result), ErrorType::FunctionInvokeFailed);

        let mismatch = invoker.invoke(request(Closure::new("double"), vec![])).await;
        assert_eq!(error_type(&mismatch.result), ErrorType::InvalidStageResponse);
        assert!(mismatch.result.datum().as_error().unwrap().message.contains("takes 1"));
    }

    #[tokio::test]
    async fn test_panic_becomes_stage_failed() {
        let registry = ContinuationRegistry::new();
        registry.register_supplier("explode", |(): ()| async move {
            let fail = true;
            if fail {
                panic!("exploded");
            }
            Ok(0)
        });

        let response = invoker(registry)
            .invoke(request(Closure::new("explode"), vec![]))
            .await;
        assert_eq!(error_type(&response.result), ErrorType::StageFailed);
    }

    #[tokio::test]
    async fn test_body_runs_inside_flow_context() {
        let registry = ContinuationRegistry::new();
        registry.register_supplier("whoami", |(): ()| async move {
            Ok(context::current_flow()?.id().to_string())
        });

        let response = invoker(registry)
            .invoke(request(Closure::new("whoami"), vec![]))
            .await;
        assert_eq!(response.result, value(&"f"));
        assert!(!context::is_active());
    }

    #[tokio::test]
    async fn test_recovery_receives_bridged_error() {
        let registry = ContinuationRegistry::new();
        registry.register_recovery("fallback", |(): (), err: FlowError| async move {
            let message = err.as_stage_failure().and_then(|f| f.message()).unwrap_or_default().to_string();
            Ok(format!("recovered from {message}"))
        });

        let failed = CompletionResult::failure(Datum::error(ErrorType::UserError, "bad"));
        let response = invoker(registry)
            .invoke(request(Closure::new("fallback"), vec![failed]))
            .await;
        assert_eq!(response.result, value(&"recovered from bad"));
    }

    #[tokio::test]
    async fn test_composer_returns_stage_reference() {
        let registry = ContinuationRegistry::new();
        registry.register_composer("next", |(): (), _v: i64| async move {
            let flow = context::current_flow()?;
            Ok(FlowFuture::<i64>::new(flow, StageId::new("7")))
        });

        let response = invoker(registry)
            .invoke(request(Closure::new("next"), vec![value(&1)]))
            .await;
        assert_eq!(
            response.result,
            CompletionResult::success(Datum::stage_ref(StageId::new("7")))
        );
    }

    #[tokio::test]
    async fn test_composer_rejects_stage_of_other_flow() {
        let registry = ContinuationRegistry::new();
        registry.register_composer("elsewhere", |(): (), _v: i64| async move {
            let other = Flow::new(FlowId::new("other"), Arc::new(MockCompleterClient::new()));
            Ok(FlowFuture::<i64>::new(other, StageId::new("7")))
        });

        let response = invoker(registry)
            .invoke(request(Closure::new("elsewhere"), vec![value(&1)]))
            .await;
        assert!(response.result.is_failure());
        let message = &response.result.datum().as_error().unwrap().message;
        assert!(message.contains("belongs to flow other"), "{message}");
    }

    #[tokio::test]
    async fn test_recovery_composer_adopts_from_failure() {
        let registry = ContinuationRegistry::new();
        registry.register_recovery_composer("retry", |(): (), _err: FlowError| async move {
            let flow = context::current_flow()?;
            Ok(FlowFuture::<i64>::new(flow, StageId::new("9")))
        });
        let invoker = invoker(registry);

        let failed = CompletionResult::failure(Datum::error(ErrorType::UserError, "bad"));
        let response = invoker.invoke(request(Closure::new("retry"), vec![failed])).await;
        assert_eq!(
            response.result,
            CompletionResult::success(Datum::stage_ref(StageId::new("9")))
        );

        let wrong = invoker.invoke(request(Closure::new("retry"), vec![value(&1)])).await;
        assert_eq!(error_type(&wrong.result), ErrorType::UserError);
    }

    #[tokio::test]
    async fn test_combiner_receives_both_values() {
        let registry = ContinuationRegistry::new();
        registry.register_combiner("label", |sep: String, n: i64, name: String| async move {
            Ok(format!("{name}{sep}{n}"))
        });
        assert_eq!(registry.kind("label"), Some(ContinuationKind::Combiner));

        let response = invoker(registry)
            .invoke(request(
                Closure::with_captured("label", &"#").unwrap(),
                vec![value(&3_i64), value(&"order")],
            ))
            .await;
        assert_eq!(response.result, value(&"order#3"));
    }

    #[tokio::test]
    async fn test_handler_sees_value_or_error() {
        let registry = ContinuationRegistry::new();
        registry.register_handler("describe", |(): (), outcome: Result<i64, FlowError>| async move {
            Ok(match outcome {
                Ok(v) => format!("value {v}"),
                Err(err) => format!("error {}", err.error_type()),
            })
        });
        let invoker = invoker(registry);

        let ok = invoker
            .invoke(request(Closure::new("describe"), vec![value(&5_i64), CompletionResult::empty()]))
            .await;
        assert_eq!(ok.result, value(&"value 5"));

        let failed = CompletionResult::failure(Datum::error(ErrorType::StageTimeout, "slow"));
        let err = invoker
            .invoke(request(Closure::new("describe"), vec![CompletionResult::empty(), failed]))
            .await;
        assert_eq!(err.result, value(&"error stage_timeout"));

        let mismatch = invoker
            .invoke(request(Closure::new("describe"), vec![value(&5_i64)]))
            .await;
        assert!(mismatch.result.is_failure());
    }

    #[tokio::test]
    async fn test_hook_receives_state() {
        let registry = ContinuationRegistry::new();
        registry.register_hook("audit", |(): (), state: FlowState| async move {
            anyhow::ensure!(state == FlowState::Succeeded, "unexpected state {state}");
            Ok(())
        });
        let invoker = invoker(registry);

        let ok = invoker
            .invoke(request(
                Closure::new("audit"),
                vec![CompletionResult::success(Datum::State(FlowState::Succeeded))],
            ))
            .await;
        assert_eq!(ok.result, CompletionResult::empty());

        let failed = invoker
            .invoke(request(
                Closure::new("audit"),
                vec![CompletionResult::success(Datum::State(FlowState::Killed))],
            ))
            .await;
        assert!(failed.result.is_failure());
    }

    #[tokio::test]
    async fn test_invoke_json() {
        let registry = ContinuationRegistry::new();
        registry.register_function("len", |(): (), s: String| async move { Ok(s.len()) });

        let body = serde_json::to_vec(&request(Closure::new("len"), vec![value(&"four")])).unwrap();
        let response = invoker(registry).invoke_json(&body).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&response).unwrap();
        assert_eq!(json["result"]["successful"], serde_json::json!(true));

        assert!(matches!(
            ContinuationInvoker::new(
                Arc::new(ContinuationRegistry::new()),
                Arc::new(MockCompleterClient::new())
            )
            .invoke_json(b"{")
            .await,
            Err(FlowError::Codec(_))
        ));
    }
}
