//! 拦截器链装配与洋葱顺序的端到端验证。

use std::sync::{Arc, Mutex};

use futures::executor::block_on;
use serde::{Deserialize, Serialize};

use spark_call::error::codes;
use spark_call::interceptor::{PassthroughInterceptor, ascii_header};
use spark_call::test_stubs::{LabelInterceptor, MockTransport, RecordingSink, event_log};
use spark_call::{
    CallDescriptor, CallEventKind, CallFactory, CallHandle, CallInterceptor, CallInvoker,
    CallListener, CallOptions, CallShape, ListenerOverride, Marshaller, MetadataValue,
    MethodDescriptor, Status, WriteFlags,
};

fn echo_method() -> MethodDescriptor {
    MethodDescriptor::new("demo.Echo/Echo", CallShape::Unary)
}

fn invoker(transport: &MockTransport) -> CallInvoker {
    CallInvoker::builder(Arc::new(transport.clone())).build()
}

/// 两层追踪拦截器下的完整事件序列：构造与出站自外向内，入站自内向外。
#[test]
fn onion_ordering_is_symmetric() {
    let transport = MockTransport::new();
    let log = event_log();
    let options = CallOptions {
        interceptors: vec![
            Arc::new(LabelInterceptor::new("a", Arc::clone(&log))),
            Arc::new(LabelInterceptor::new("b", Arc::clone(&log))),
        ],
        ..CallOptions::default()
    };

    let mut call = invoker(&transport)
        .unary_payload(echo_method(), b"foo".to_vec(), options)
        .expect("invoke");
    let reply = block_on(call.response()).expect("echo reply");
    assert_eq!(reply.payload, b"foo");

    assert_eq!(
        log.lock().as_slice(),
        [
            "construct a",
            "construct b",
            "start a",
            "start b",
            "send a",
            "send b",
            "half_close a",
            "half_close b",
            "receive b",
            "receive a",
            "message b",
            "message a",
            "status b",
            "status a",
        ]
    );
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct EchoPayload {
    value: String,
}

/// JSON 编解码失败的底层原因，经 `with_cause` 挂到编解码错误链上。
#[derive(Debug, thiserror::Error)]
#[error("json codec: {0}")]
struct JsonCodecError(#[from] serde_json::Error);

impl spark_call::Error for JsonCodecError {
    fn source(&self) -> Option<&(dyn spark_call::Error + 'static)> {
        None
    }
}

fn json_marshaller() -> Marshaller<EchoPayload, EchoPayload> {
    Marshaller::new(
        |req: &EchoPayload| {
            serde_json::to_vec(req).map_err(|e| {
                spark_call::CallError::new(codes::CALL_MARSHAL, "请求编码失败")
                    .with_cause(JsonCodecError(e))
            })
        },
        |bytes: &[u8]| {
            serde_json::from_slice(bytes).map_err(|e| {
                spark_call::CallError::new(codes::CALL_MARSHAL, "响应解码失败")
                    .with_cause(JsonCodecError(e))
            })
        },
    )
}

#[test]
fn marshal_failure_surfaces_with_cause_chain() {
    use spark_call::Error as _;

    let marshaller = json_marshaller();
    let err = marshaller.deserialize(b"not json").expect_err("invalid payload");
    assert_eq!(err.code(), codes::CALL_MARSHAL);
    assert!(err.source().is_some());
}

/// 端到端：Echo + 头部注入 + 透传占位，响应回显请求、响应头镜像出站元数据。
#[test]
fn echo_end_to_end_with_header_injection() {
    let transport = MockTransport::new();
    let options = CallOptions {
        interceptors: vec![
            Arc::new(ascii_header("k", "v").expect("valid header")),
            Arc::new(PassthroughInterceptor),
        ],
        ..CallOptions::default()
    };

    let marshaller = json_marshaller();
    let request = EchoPayload {
        value: "foo".into(),
    };
    let mut call = invoker(&transport)
        .unary(echo_method(), &marshaller, &request, options)
        .expect("invoke");
    let reply = block_on(call.response()).expect("ok status");

    let decoded = reply.decode(&marshaller).expect("decode");
    assert_eq!(decoded, request);
    assert_eq!(
        reply
            .headers
            .get("k")
            .and_then(MetadataValue::as_ascii),
        Some("v")
    );
    assert_eq!(transport.started_calls(), 1);
}

/// 双调 `next` 的监听器缺陷：上层只见一个终态，重复交付被闸门上报。
struct DoubleStatus;

impl CallInterceptor for DoubleStatus {
    fn intercept(
        &self,
        descriptor: &CallDescriptor,
        next: Arc<dyn CallFactory>,
    ) -> Box<dyn CallHandle> {
        struct Hooks;
        impl ListenerOverride for Hooks {
            fn on_status(&mut self, status: Status, next: &mut dyn CallListener) {
                next.on_status(status.clone());
                next.on_status(status);
            }
        }
        Box::new(spark_call::InterceptingCall::with_listener(
            next.create_call(descriptor),
            Box::new(Hooks),
        ))
    }
}

#[test]
fn duplicate_terminal_status_is_dropped_and_reported() {
    let transport = MockTransport::new();
    let sink = RecordingSink::new();
    let invoker = CallInvoker::builder(Arc::new(transport.clone()))
        .with_event_sink(Arc::new(sink.clone()))
        .build();

    let options = CallOptions {
        interceptors: vec![Arc::new(DoubleStatus)],
        ..CallOptions::default()
    };
    let mut call = invoker
        .unary_payload(echo_method(), b"foo".to_vec(), options)
        .expect("invoke");
    let reply = block_on(call.response()).expect("first status wins");
    assert_eq!(reply.payload, b"foo");
    assert_eq!(sink.count(CallEventKind::DuplicateStatusDropped), 1);

    let kinds = sink.kinds();
    assert!(kinds.contains(&CallEventKind::ChainAssembled));
    assert!(kinds.contains(&CallEventKind::CallStarted));
}

/// 双向流：每条请求各回显为一条响应，半关后消息流有序结束、终态为 OK。
#[test]
fn bidi_round_trip_echoes_each_message() {
    let transport = MockTransport::new();
    let method = MethodDescriptor::new("demo.Chat/Talk", CallShape::BidiStreaming);
    let mut call = invoker(&transport)
        .bidi_streaming(method, CallOptions::default())
        .expect("invoke");

    call.send(b"one".to_vec(), WriteFlags::default()).expect("send");
    call.send(b"two".to_vec(), WriteFlags::default()).expect("send");
    call.half_close().expect("half close");

    assert_eq!(block_on(call.next_message()).as_deref(), Some(&b"one"[..]));
    assert_eq!(block_on(call.next_message()).as_deref(), Some(&b"two"[..]));
    assert_eq!(block_on(call.next_message()), None);
    assert!(block_on(call.status()).is_ok());
    assert!(call.headers().is_some());
}

/// 调用选项中的宿主覆盖进入描述符，对链上每个拦截器可见。
#[test]
fn option_host_override_is_visible_to_interceptors() {
    let transport = MockTransport::new();
    let seen = Arc::new(Mutex::new(None));
    let options = CallOptions {
        host_override: Some("primary.example".into()),
        interceptors: vec![Arc::new(CaptureHost {
            seen: Arc::clone(&seen),
        })],
        ..CallOptions::default()
    };

    let mut call = invoker(&transport)
        .unary_payload(echo_method(), b"foo".to_vec(), options)
        .expect("invoke");
    block_on(call.response()).expect("ok");

    assert_eq!(
        *seen.lock().unwrap(),
        Some(Some("primary.example".to_owned()))
    );
}

/// 派生描述符只影响更内层：外层看到原值，内层看到覆盖值。
struct CaptureHost {
    seen: Arc<Mutex<Option<Option<String>>>>,
}

impl CallInterceptor for CaptureHost {
    fn intercept(
        &self,
        descriptor: &CallDescriptor,
        next: Arc<dyn CallFactory>,
    ) -> Box<dyn CallHandle> {
        *self.seen.lock().unwrap() = Some(descriptor.host_override().map(str::to_owned));
        next.create_call(descriptor)
    }
}

struct RewriteHost;

impl CallInterceptor for RewriteHost {
    fn intercept(
        &self,
        descriptor: &CallDescriptor,
        next: Arc<dyn CallFactory>,
    ) -> Box<dyn CallHandle> {
        let derived = descriptor
            .to_builder()
            .with_host_override("backup.example")
            .build();
        next.create_call(&derived)
    }
}

#[test]
fn derived_descriptor_is_scoped_to_inner_layers() {
    let transport = MockTransport::new();
    let outer_seen = Arc::new(Mutex::new(None));
    let inner_seen = Arc::new(Mutex::new(None));
    let options = CallOptions {
        interceptors: vec![
            Arc::new(CaptureHost {
                seen: Arc::clone(&outer_seen),
            }),
            Arc::new(RewriteHost),
            Arc::new(CaptureHost {
                seen: Arc::clone(&inner_seen),
            }),
        ],
        ..CallOptions::default()
    };

    let mut call = invoker(&transport)
        .unary_payload(echo_method(), b"foo".to_vec(), options)
        .expect("invoke");
    block_on(call.response()).expect("ok");

    assert_eq!(*outer_seen.lock().unwrap(), Some(None));
    assert_eq!(
        *inner_seen.lock().unwrap(),
        Some(Some("backup.example".to_owned()))
    );
}
