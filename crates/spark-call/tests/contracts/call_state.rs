//! 调用状态契约：非法操作在调用表面同步被拒，不触达传输层。

use std::sync::Arc;

use futures::executor::block_on;

use spark_call::error::codes;
use spark_call::interceptor::PassthroughInterceptor;
use spark_call::test_stubs::MockTransport;
use spark_call::{
    CallInvoker, CallOptions, CallShape, InterceptorProvider, MethodDescriptor, WriteFlags,
};

fn invoker(transport: &MockTransport) -> CallInvoker {
    CallInvoker::builder(Arc::new(transport.clone())).build()
}

/// 客户端流半关后继续发送：同步报状态违例，传输层未收到多余的 send。
#[test]
fn send_after_half_close_is_rejected_before_transport() {
    let transport = MockTransport::new();
    let method = MethodDescriptor::new("demo.Sink/Collect", CallShape::ClientStreaming);
    let mut call = invoker(&transport)
        .client_streaming(method, CallOptions::default())
        .expect("invoke");

    call.send(b"one".to_vec(), WriteFlags::default()).expect("legal send");
    call.half_close().expect("legal half-close");

    let err = call
        .send(b"late".to_vec(), WriteFlags::default())
        .expect_err("send after half-close");
    assert_eq!(err.code(), codes::CALL_STATE_VIOLATION);

    let sends = transport
        .operations()
        .iter()
        .filter(|op| op.starts_with("send "))
        .count();
    assert_eq!(sends, 1);

    let reply = block_on(call.response()).expect("echo reply");
    assert_eq!(reply.payload, b"one");
}

/// 重复半关同样是同步违例。
#[test]
fn double_half_close_is_rejected() {
    let transport = MockTransport::new();
    let method = MethodDescriptor::new("demo.Sink/Collect", CallShape::ClientStreaming);
    let mut call = invoker(&transport)
        .client_streaming(method, CallOptions::default())
        .expect("invoke");
    call.half_close().expect("first half-close");
    let err = call.half_close().expect_err("second half-close");
    assert_eq!(err.code(), codes::CALL_STATE_VIOLATION);
}

/// 方法形状与入口不匹配：构造任何调用对象之前即失败。
#[test]
fn shape_mismatch_fails_before_construction() {
    let transport = MockTransport::new();
    let method = MethodDescriptor::new("demo.Sink/Collect", CallShape::ClientStreaming);
    let err = invoker(&transport)
        .unary_payload(method, b"foo".to_vec(), CallOptions::default())
        .err()
        .expect("wrong shape");
    assert_eq!(err.code(), codes::CALL_STATE_VIOLATION);
    assert_eq!(transport.created_calls(), 0);
}

/// 显式列表与提供者列表同时非空：配置冲突快速失败，零网络活动。
#[test]
fn conflicting_interceptor_configuration_fails_fast() {
    struct NeverProvider;
    impl InterceptorProvider for NeverProvider {
        fn provide(
            &self,
            _method: &MethodDescriptor,
        ) -> Option<Arc<dyn spark_call::CallInterceptor>> {
            None
        }
    }

    let transport = MockTransport::new();
    let options = CallOptions {
        interceptors: vec![Arc::new(PassthroughInterceptor)],
        interceptor_providers: vec![Arc::new(NeverProvider)],
        ..CallOptions::default()
    };
    let err = invoker(&transport)
        .unary_payload(
            MethodDescriptor::new("demo.Echo/Echo", CallShape::Unary),
            b"foo".to_vec(),
            options,
        )
        .err()
        .expect("conflicting configuration");
    assert_eq!(err.code(), codes::CALL_INTERCEPTOR_CONFLICT);
    assert_eq!(transport.created_calls(), 0);
}

/// 提供者路径：按方法筛选出的拦截器正常生效。
#[test]
fn providers_resolve_per_method() {
    struct EchoOnly;
    impl InterceptorProvider for EchoOnly {
        fn provide(
            &self,
            method: &MethodDescriptor,
        ) -> Option<Arc<dyn spark_call::CallInterceptor>> {
            method
                .full_name()
                .starts_with("demo.Echo/")
                .then(|| Arc::new(PassthroughInterceptor) as Arc<dyn spark_call::CallInterceptor>)
        }
    }

    let transport = MockTransport::new();
    let options = CallOptions {
        interceptor_providers: vec![Arc::new(EchoOnly)],
        ..CallOptions::default()
    };
    let mut call = invoker(&transport)
        .unary_payload(
            MethodDescriptor::new("demo.Echo/Echo", CallShape::Unary),
            b"foo".to_vec(),
            options,
        )
        .expect("invoke");
    let reply = block_on(call.response()).expect("ok");
    assert_eq!(reply.payload, b"foo");
}
