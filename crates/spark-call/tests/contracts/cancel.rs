//! 取消契约：幂等、与真实终态的竞争裁决、以及终态后的空操作。

use std::sync::Arc;

use futures::executor::block_on;

use spark_call::test_stubs::{MockTransport, RecordingSink, ReplyScript};
use spark_call::{
    CallEventKind, CallInvoker, CallOptions, CallShape, Cancellation, MethodDescriptor, StatusCode,
};

fn unary_method() -> MethodDescriptor {
    MethodDescriptor::new("demo.Echo/Echo", CallShape::Unary)
}

/// 两次取消只产生一次 `CANCELLED` 交付。
#[test]
fn double_cancel_delivers_exactly_one_cancelled() {
    let transport = MockTransport::with_scripts(vec![ReplyScript::Silent]);
    let sink = RecordingSink::new();
    let invoker = CallInvoker::builder(Arc::new(transport.clone()))
        .with_event_sink(Arc::new(sink.clone()))
        .build();

    let mut call = invoker
        .unary_payload(unary_method(), b"foo".to_vec(), CallOptions::default())
        .expect("invoke");
    call.cancel("caller gave up");
    call.cancel("caller gave up again");

    let status = block_on(call.response()).expect_err("cancelled");
    assert_eq!(status.code(), StatusCode::Cancelled);
    assert_eq!(sink.count(CallEventKind::DuplicateStatusDropped), 0);
}

/// 取消柄可独立传递，效果与在调用对象上取消一致。
#[test]
fn cancel_handle_resolves_pending_call() {
    let transport = MockTransport::with_scripts(vec![ReplyScript::Silent]);
    let invoker = CallInvoker::builder(Arc::new(transport.clone())).build();

    let mut call = invoker
        .unary_payload(unary_method(), b"foo".to_vec(), CallOptions::default())
        .expect("invoke");
    let handle = call.cancel_handle();
    assert!(!handle.is_cancelled());
    handle.cancel("deadline policy");
    assert!(handle.is_cancelled());

    let status = block_on(call.response()).expect_err("cancelled");
    assert_eq!(status.code(), StatusCode::Cancelled);
}

/// 选项中的取消令牌与调用表面共享同一原子位：表面取消对令牌可见。
#[test]
fn option_token_observes_surface_cancel() {
    let transport = MockTransport::with_scripts(vec![ReplyScript::Silent]);
    let invoker = CallInvoker::builder(Arc::new(transport.clone())).build();

    let token = Cancellation::new();
    let options = CallOptions {
        cancellation: token.clone(),
        ..CallOptions::default()
    };
    let mut call = invoker
        .unary_payload(unary_method(), b"foo".to_vec(), options)
        .expect("invoke");

    assert!(!token.is_cancelled());
    call.cancel("caller gave up");
    assert!(token.is_cancelled());

    let status = block_on(call.response()).expect_err("cancelled");
    assert_eq!(status.code(), StatusCode::Cancelled);
}

/// 成功终态已交付后的取消是空操作：结果不变，也没有第二个终态。
#[test]
fn cancel_after_terminal_status_is_noop() {
    let transport = MockTransport::new();
    let sink = RecordingSink::new();
    let invoker = CallInvoker::builder(Arc::new(transport.clone()))
        .with_event_sink(Arc::new(sink.clone()))
        .build();

    let mut call = invoker
        .unary_payload(unary_method(), b"foo".to_vec(), CallOptions::default())
        .expect("invoke");
    let reply = block_on(call.response()).expect("ok before cancel");
    assert_eq!(reply.payload, b"foo");

    call.cancel("too late");
    call.cancel("way too late");
    assert_eq!(sink.count(CallEventKind::DuplicateStatusDropped), 0);
}

/// 流式调用取消后：消息流结束，终态为 `CANCELLED`。
#[test]
fn streaming_cancel_closes_stream_with_cancelled_status() {
    let transport = MockTransport::with_scripts(vec![ReplyScript::Silent]);
    let invoker = CallInvoker::builder(Arc::new(transport.clone())).build();

    let method = MethodDescriptor::new("demo.Feed/Watch", CallShape::ServerStreaming);
    let mut call = invoker
        .server_streaming(method, b"topic".to_vec(), CallOptions::default())
        .expect("invoke");
    call.cancel("viewer closed");

    assert_eq!(block_on(call.next_message()), None);
    let status = block_on(call.status());
    assert_eq!(status.code(), StatusCode::Cancelled);
}
