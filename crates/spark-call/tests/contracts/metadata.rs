//! 元数据契约：克隆独立性、键校验与入站冻结。

use std::sync::Arc;

use futures::executor::block_on;

use spark_call::error::codes;
use spark_call::test_stubs::MockTransport;
use spark_call::{
    CallInvoker, CallOptions, CallShape, Metadata, MetadataValue, MethodDescriptor,
};

/// 克隆是深拷贝：双向独立，互不可见。
#[test]
fn clone_is_deeply_independent() {
    let mut m1 = Metadata::new();
    m1.insert("shared", MetadataValue::ascii("base")).unwrap();

    let mut m2 = m1.clone();
    m1.insert("only-m1", MetadataValue::ascii("x")).unwrap();
    m2.insert("only-m2", MetadataValue::ascii("y")).unwrap();

    assert!(m1.get("only-m2").is_none());
    assert!(m2.get("only-m1").is_none());
    assert_eq!(m1.len(), 2);
    assert_eq!(m2.len(), 2);
}

/// 键校验错误同步上报，绝不静默丢弃。
#[test]
fn mutator_errors_surface_synchronously() {
    let mut md = Metadata::new();
    assert_eq!(
        md.insert("UPPER", MetadataValue::ascii("v")).unwrap_err().code(),
        codes::METADATA_INVALID_KEY
    );
    assert_eq!(
        md.insert("trace-bin", MetadataValue::ascii("text")).unwrap_err().code(),
        codes::METADATA_INVALID_KEY
    );
    md.freeze();
    assert_eq!(
        md.insert("k", MetadataValue::ascii("v")).unwrap_err().code(),
        codes::METADATA_IMMUTABLE
    );
}

/// 经由管线交付的入站元数据已冻结；调用方保留的出站底稿不受影响。
#[test]
fn inbound_metadata_arrives_frozen() {
    let transport = MockTransport::new();
    let invoker = CallInvoker::builder(Arc::new(transport.clone())).build();

    let mut outbound = Metadata::new();
    outbound.insert("k", MetadataValue::ascii("v")).unwrap();
    let options = CallOptions {
        metadata: outbound.clone(),
        ..CallOptions::default()
    };

    let mut call = invoker
        .unary_payload(
            MethodDescriptor::new("demo.Echo/Echo", CallShape::Unary),
            b"foo".to_vec(),
            options,
        )
        .expect("invoke");
    let reply = block_on(call.response()).expect("ok");

    assert!(reply.headers.is_frozen());
    assert_eq!(
        reply.headers.get("k").and_then(MetadataValue::as_ascii),
        Some("v")
    );
    // 调用方手里的底稿仍可继续修改。
    outbound.insert("again", MetadataValue::ascii("w")).unwrap();
}

/// 尾部元数据随终态一起冻结。
#[test]
fn trailers_arrive_frozen() {
    let transport = MockTransport::new();
    let invoker = CallInvoker::builder(Arc::new(transport.clone())).build();
    let mut call = invoker
        .unary_payload(
            MethodDescriptor::new("demo.Echo/Echo", CallShape::Unary),
            b"foo".to_vec(),
            CallOptions::default(),
        )
        .expect("invoke");
    let reply = block_on(call.response()).expect("ok");
    assert!(reply.trailers.is_frozen());
}
