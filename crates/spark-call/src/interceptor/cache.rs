//! 缓存拦截器：按请求内容短路命中的调用。
//!
//! # 设计背景（Why）
//! - 命中时直接以缓存内容驱动自身监听器，内层调用虽已构造（保留取消钩子）
//!   但**永不**被 `start`，传输层对命中调用零感知；
//! - 缓存键为 `SHA-256(方法全名 ‖ 出站载荷序列)`，内容寻址使键与编码格式解耦；
//! - 仅缓存以 `OK` 终态收尾的完整响应。

use alloc::borrow::ToOwned;
use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use alloc::vec::Vec;

use sha2::{Digest, Sha256};
use spin::Mutex;

use crate::descriptor::{CallDescriptor, WriteFlags};
use crate::error::{CallError, codes};
use crate::metadata::Metadata;
use crate::observability::{CallEvent, CallEventKind, NoopEventSink, SharedEventSink};
use crate::pipeline::chain::{CallInterceptor, InterceptorDescriptor};
use crate::pipeline::handle::{CallFactory, CallHandle, CallListener};
use crate::status::Status;

type CacheKey = [u8; 32];

/// 命中时回放的完整响应快照。
#[derive(Clone)]
struct CachedReply {
    headers: Metadata,
    messages: Vec<Vec<u8>>,
    trailers: Metadata,
}

type CacheStore = Arc<Mutex<BTreeMap<CacheKey, CachedReply>>>;

/// 按请求内容缓存成功响应的拦截器。
///
/// # 契约说明（What）
/// - 出站消息在 `half_close` 之前全量缓冲，半关时才裁决命中与否：
///   命中则回放缓存事件序列（元数据 → 消息 → OK 终态），未命中则启动内层
///   调用并在其成功收尾时填充缓存；
/// - 同一拦截器实例的缓存存储被它产出的所有调用共享。
pub struct CacheInterceptor {
    store: CacheStore,
    sink: SharedEventSink,
}

impl CacheInterceptor {
    /// 创建空缓存的拦截器。
    pub fn new() -> Self {
        Self {
            store: Arc::new(Mutex::new(BTreeMap::new())),
            sink: Arc::new(NoopEventSink),
        }
    }

    /// 注入事件接收器。
    pub fn with_event_sink(mut self, sink: SharedEventSink) -> Self {
        self.sink = sink;
        self
    }
}

impl Default for CacheInterceptor {
    fn default() -> Self {
        Self::new()
    }
}

impl CallInterceptor for CacheInterceptor {
    fn descriptor(&self) -> InterceptorDescriptor {
        InterceptorDescriptor::new("cache", "short-circuit", "按请求内容短路命中的调用")
    }

    fn intercept(
        &self,
        descriptor: &CallDescriptor,
        next: Arc<dyn CallFactory>,
    ) -> Box<dyn CallHandle> {
        Box::new(CacheCall {
            inner: Arc::new(Mutex::new(next.create_call(descriptor))),
            descriptor: descriptor.clone(),
            store: Arc::clone(&self.store),
            sink: Arc::clone(&self.sink),
            state: CacheCallState::Buffering {
                outer: None,
                metadata: None,
                payloads: Vec::new(),
                flags: Vec::new(),
            },
        })
    }
}

enum CacheCallState {
    /// 半关之前：缓冲出站序列，内层调用保持未启动。
    Buffering {
        outer: Option<Box<dyn CallListener>>,
        metadata: Option<Metadata>,
        payloads: Vec<Vec<u8>>,
        flags: Vec<WriteFlags>,
    },
    /// 半关之后：命中已回放，或内层调用已接管。
    Resolved,
}

struct CacheCall {
    inner: Arc<Mutex<Box<dyn CallHandle>>>,
    descriptor: CallDescriptor,
    store: CacheStore,
    sink: SharedEventSink,
    state: CacheCallState,
}

impl CacheCall {
    fn digest(&self, payloads: &[Vec<u8>]) -> CacheKey {
        let mut hasher = Sha256::new();
        hasher.update(self.descriptor.method().full_name().as_bytes());
        for payload in payloads {
            hasher.update((payload.len() as u64).to_be_bytes());
            hasher.update(payload);
        }
        hasher.finalize().into()
    }
}

impl CallHandle for CacheCall {
    fn start(&mut self, metadata: Metadata, listener: Box<dyn CallListener>) -> crate::Result<()> {
        match &mut self.state {
            CacheCallState::Buffering {
                outer, metadata: buffered, ..
            } => {
                if outer.is_some() {
                    return Err(CallError::new(
                        codes::CALL_ALREADY_STARTED,
                        "调用已启动，不允许重复 start",
                    ));
                }
                *outer = Some(listener);
                *buffered = Some(metadata);
                Ok(())
            }
            CacheCallState::Resolved => Err(CallError::new(
                codes::CALL_ALREADY_STARTED,
                "调用已启动，不允许重复 start",
            )),
        }
    }

    fn send_message(&mut self, payload: Vec<u8>, write_flags: WriteFlags) -> crate::Result<()> {
        match &mut self.state {
            CacheCallState::Buffering {
                outer,
                payloads,
                flags,
                ..
            } => {
                if outer.is_none() {
                    return Err(CallError::new(
                        codes::CALL_STATE_VIOLATION,
                        "start 之前不允许发送消息",
                    ));
                }
                payloads.push(payload);
                flags.push(write_flags);
                Ok(())
            }
            CacheCallState::Resolved => Err(CallError::new(
                codes::CALL_STATE_VIOLATION,
                "半关之后不允许发送消息",
            )),
        }
    }

    fn half_close(&mut self) -> crate::Result<()> {
        let (mut outer, metadata, payloads, flags) =
            match core::mem::replace(&mut self.state, CacheCallState::Resolved) {
                CacheCallState::Buffering {
                    outer: Some(outer),
                    metadata,
                    payloads,
                    flags,
                } => (outer, metadata, payloads, flags),
                CacheCallState::Buffering { outer: None, .. } => {
                    return Err(CallError::new(
                        codes::CALL_STATE_VIOLATION,
                        "start 之前不允许半关",
                    ));
                }
                CacheCallState::Resolved => {
                    return Err(CallError::new(
                        codes::CALL_STATE_VIOLATION,
                        "半关仅合法一次",
                    ));
                }
            };

        let key = self.digest(&payloads);
        let hit = self.store.lock().get(&key).cloned();
        if let Some(reply) = hit {
            self.sink.record(CallEvent::new(
                CallEventKind::CacheHit,
                self.descriptor.method().full_name().to_owned(),
            ));
            outer.on_metadata(reply.headers.clone());
            for message in reply.messages {
                outer.on_message(message);
            }
            outer.on_status(Status::ok().with_trailers(reply.trailers.clone()));
            return Ok(());
        }

        let fill = FillListener {
            outer,
            store: Arc::clone(&self.store),
            key,
            headers: None,
            messages: Vec::new(),
        };
        let mut inner = self.inner.lock();
        inner.start(metadata.unwrap_or_default(), Box::new(fill))?;
        for (payload, write_flags) in payloads.into_iter().zip(flags) {
            inner.send_message(payload, write_flags)?;
        }
        inner.half_close()
    }

    fn cancel(&mut self, reason: &str) {
        self.inner.lock().cancel(reason);
    }
}

/// 未命中路径的监听器：向上透传的同时收集可缓存的成功响应。
struct FillListener {
    outer: Box<dyn CallListener>,
    store: CacheStore,
    key: CacheKey,
    headers: Option<Metadata>,
    messages: Vec<Vec<u8>>,
}

impl CallListener for FillListener {
    fn on_metadata(&mut self, metadata: Metadata) {
        self.headers = Some(metadata.clone());
        self.outer.on_metadata(metadata);
    }

    fn on_message(&mut self, payload: Vec<u8>) {
        self.messages.push(payload.clone());
        self.outer.on_message(payload);
    }

    fn on_status(&mut self, status: Status) {
        if status.is_ok() {
            self.store.lock().insert(
                self.key,
                CachedReply {
                    headers: self.headers.take().unwrap_or_default(),
                    messages: core::mem::take(&mut self.messages),
                    trailers: status.trailers().clone(),
                },
            );
        }
        self.outer.on_status(status);
    }
}
