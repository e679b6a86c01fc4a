//! 内置拦截器模式：缓存短路、重试重放、流式回退及三者叠放。

use std::sync::Arc;
use std::time::Duration;

use futures::executor::block_on;

use spark_call::interceptor::{CacheInterceptor, FallbackInterceptor, RetryInterceptor, RetryPolicy};
use spark_call::test_stubs::{MockTransport, RecordingSink, ReplyScript};
use spark_call::{
    CallEventKind, CallInterceptor, CallInvoker, CallOptions, CallShape, MethodDescriptor,
    StatusCode,
};

fn unary_method() -> MethodDescriptor {
    MethodDescriptor::new("demo.Echo/Echo", CallShape::Unary)
}

fn invoker_with(transport: &MockTransport, sink: &RecordingSink) -> CallInvoker {
    CallInvoker::builder(Arc::new(transport.clone()))
        .with_event_sink(Arc::new(sink.clone()))
        .build()
}

/// 相同请求两次调用：一次真实传输，第二次命中且内层从未 `start`。
#[test]
fn cache_short_circuits_identical_requests() {
    let transport = MockTransport::new();
    let sink = RecordingSink::new();
    let invoker = invoker_with(&transport, &sink);
    let cache: Arc<dyn CallInterceptor> =
        Arc::new(CacheInterceptor::new().with_event_sink(Arc::new(sink.clone())));

    for _ in 0..2 {
        let options = CallOptions {
            interceptors: vec![Arc::clone(&cache)],
            ..CallOptions::default()
        };
        let mut call = invoker
            .unary_payload(unary_method(), b"question".to_vec(), options)
            .expect("invoke");
        let reply = block_on(call.response()).expect("ok");
        assert_eq!(reply.payload, b"question");
    }

    // 内层句柄每次都会被构造（保留取消钩子），但传输只被启动一次。
    assert_eq!(transport.created_calls(), 2);
    assert_eq!(transport.started_calls(), 1);
    assert_eq!(sink.count(CallEventKind::CacheHit), 1);
}

/// 失败两次、第三次成功、预算为三：应用只见一次最终响应，传输记录三次构造。
#[test]
fn retry_replays_until_budget_or_success() {
    let transport = MockTransport::with_scripts(vec![
        ReplyScript::Fail(StatusCode::Unavailable),
        ReplyScript::Fail(StatusCode::Unavailable),
        ReplyScript::Echo,
    ]);
    let sink = RecordingSink::new();
    let invoker = invoker_with(&transport, &sink);

    let retry = RetryInterceptor::new(RetryPolicy::new(3, Duration::from_millis(50)))
        .with_event_sink(Arc::new(sink.clone()));
    let options = CallOptions {
        interceptors: vec![Arc::new(retry)],
        ..CallOptions::default()
    };

    let mut call = invoker
        .unary_payload(unary_method(), b"foo".to_vec(), options)
        .expect("invoke");
    let reply = block_on(call.response()).expect("third attempt succeeds");
    assert_eq!(reply.payload, b"foo");

    assert_eq!(transport.created_calls(), 3);
    assert_eq!(transport.started_calls(), 3);
    assert_eq!(sink.count(CallEventKind::RetryAttempt), 2);
}

/// 预算耗尽：失败终态原样抵达应用，尝试数等于预算。
#[test]
fn retry_budget_exhaustion_surfaces_last_status() {
    let transport = MockTransport::with_scripts(vec![
        ReplyScript::Fail(StatusCode::Unavailable),
        ReplyScript::Fail(StatusCode::Unavailable),
    ]);
    let sink = RecordingSink::new();
    let invoker = invoker_with(&transport, &sink);

    let retry = RetryInterceptor::new(RetryPolicy::new(2, Duration::from_millis(50)));
    let options = CallOptions {
        interceptors: vec![Arc::new(retry)],
        ..CallOptions::default()
    };
    let mut call = invoker
        .unary_payload(unary_method(), b"foo".to_vec(), options)
        .expect("invoke");
    let status = block_on(call.response()).expect_err("budget exhausted");
    assert_eq!(status.code(), StatusCode::Unavailable);
    assert_eq!(transport.created_calls(), 2);
}

/// 流式回退：内层失败被合成消息与 OK 终态掩盖。
#[test]
fn fallback_masks_streaming_failure() {
    let transport =
        MockTransport::with_scripts(vec![ReplyScript::Fail(StatusCode::Internal)]);
    let sink = RecordingSink::new();
    let invoker = invoker_with(&transport, &sink);

    let fallback =
        FallbackInterceptor::new(b"fallback".to_vec()).with_event_sink(Arc::new(sink.clone()));
    let options = CallOptions {
        interceptors: vec![Arc::new(fallback)],
        ..CallOptions::default()
    };
    let method = MethodDescriptor::new("demo.Feed/Watch", CallShape::ServerStreaming);
    let mut call = invoker
        .server_streaming(method, b"topic".to_vec(), options)
        .expect("invoke");

    let first = block_on(call.next_message());
    assert_eq!(first.as_deref(), Some(&b"fallback"[..]));
    assert_eq!(block_on(call.next_message()), None);
    let status = block_on(call.status());
    assert!(status.is_ok());
    assert_eq!(sink.count(CallEventKind::FallbackEngaged), 1);
}

/// 叠放契约：fallback ⊃ cache ⊃ retry，事件计数完全确定。
#[test]
fn stacked_patterns_compose_deterministically() {
    let transport = MockTransport::with_scripts(vec![
        ReplyScript::Fail(StatusCode::Unavailable),
        ReplyScript::Echo,
    ]);
    let sink = RecordingSink::new();
    let invoker = invoker_with(&transport, &sink);

    let cache: Arc<dyn CallInterceptor> = Arc::new(CacheInterceptor::new().with_event_sink(
        Arc::new(sink.clone()),
    ));
    let build_options = || CallOptions {
        interceptors: vec![
            Arc::new(
                FallbackInterceptor::new(b"fallback".to_vec())
                    .with_event_sink(Arc::new(sink.clone())),
            ),
            Arc::clone(&cache),
            Arc::new(
                RetryInterceptor::new(RetryPolicy::new(3, Duration::from_millis(50)))
                    .with_event_sink(Arc::new(sink.clone())),
            ),
        ],
        ..CallOptions::default()
    };

    // 第一轮：retry 吸收一次失败，第二次尝试成功并填充缓存。
    let mut call = invoker
        .unary_payload(unary_method(), b"stacked".to_vec(), build_options())
        .expect("invoke");
    let reply = block_on(call.response()).expect("retry succeeds");
    assert_eq!(reply.payload, b"stacked");
    assert_eq!(transport.created_calls(), 2);
    assert_eq!(transport.started_calls(), 2);

    // 第二轮：cache 命中，retry 之下再无任何传输活动。
    let mut call = invoker
        .unary_payload(unary_method(), b"stacked".to_vec(), build_options())
        .expect("invoke");
    let reply = block_on(call.response()).expect("cache hit");
    assert_eq!(reply.payload, b"stacked");

    assert_eq!(transport.created_calls(), 2);
    assert_eq!(transport.started_calls(), 2);
    assert_eq!(sink.count(CallEventKind::RetryAttempt), 1);
    assert_eq!(sink.count(CallEventKind::CacheHit), 1);
    assert_eq!(sink.count(CallEventKind::FallbackEngaged), 0);
}
