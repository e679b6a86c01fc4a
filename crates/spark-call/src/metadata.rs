//! 调用元数据：有序多值头/尾部映射。
//!
//! # 设计背景（Why）
//! - 调用开始时交换“初始元数据”（headers），终态 [`Status`](crate::status::Status)
//!   附带“尾部元数据”（trailers），二者共用同一数据结构；
//! - 键可重复且保持插入顺序，因此底层使用有序向量而非哈希映射；
//! - 以 `-bin` 结尾的键承载二进制值，其余键仅承载文本值，键字符集限定为
//!   `[a-z0-9._-]`，与主流 RPC 头部约定保持一致。

use alloc::string::String;
use alloc::vec::Vec;

use serde::{Deserialize, Serialize};

use crate::error::{CallError, codes};

/// 二进制键的保留后缀。
pub const BINARY_SUFFIX: &str = "-bin";

/// 元数据条目的值，区分文本与二进制两种载体。
///
/// # 契约说明（What）
/// - `Ascii` 仅允许出现在非 `-bin` 键下；
/// - `Binary` 仅允许出现在以 [`BINARY_SUFFIX`] 结尾的键下；
/// - 该配对约束由 [`Metadata::insert`] 在写入时校验。
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetadataValue {
    /// 文本值。
    Ascii(String),
    /// 二进制值。
    Binary(Vec<u8>),
}

impl MetadataValue {
    /// 以文本构造值。
    pub fn ascii(value: impl Into<String>) -> Self {
        Self::Ascii(value.into())
    }

    /// 以字节构造值。
    pub fn binary(value: impl Into<Vec<u8>>) -> Self {
        Self::Binary(value.into())
    }

    /// 若为文本值则返回其内容。
    pub fn as_ascii(&self) -> Option<&str> {
        match self {
            Self::Ascii(text) => Some(text),
            Self::Binary(_) => None,
        }
    }

    /// 若为二进制值则返回其内容。
    pub fn as_binary(&self) -> Option<&[u8]> {
        match self {
            Self::Binary(bytes) => Some(bytes),
            Self::Ascii(_) => None,
        }
    }
}

/// 有序多值元数据映射。
///
/// # 逻辑解析（How）
/// - 条目以插入顺序保存在向量中，同键多值合法且顺序可见；
/// - `get` 返回同键的**最后**一个值（后写优先），`get_all` 按插入顺序返回全部；
/// - `freeze` 将实例标记为只读，之后所有修改操作返回
///   [`codes::METADATA_IMMUTABLE`] 错误；入站交付给监听器前由管线统一冻结。
///
/// # 契约说明（What）
/// - **克隆语义**：`clone()` 产生深拷贝且**不继承**冻结标记——派生调用常以历史
///   元数据为底稿继续修改，冻结仅约束被交付的那一份实例；
/// - **并发约束**：单个实例不跨并发调用共享；跨调用传递前先克隆。
#[derive(Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    entries: Vec<(String, MetadataValue)>,
    frozen: bool,
}

impl Clone for Metadata {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
            frozen: false,
        }
    }
}

impl Metadata {
    /// 创建空元数据。
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一个键值条目。
    ///
    /// # 契约说明（What）
    /// - **前置条件**：键满足 `[a-z0-9._-]` 字符集且非空；`-bin` 键仅接受
    ///   [`MetadataValue::Binary`]，其余键仅接受 [`MetadataValue::Ascii`]；
    /// - **错误**：键不合法返回 [`codes::METADATA_INVALID_KEY`]；实例已冻结返回
    ///   [`codes::METADATA_IMMUTABLE`]。
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: MetadataValue,
    ) -> crate::Result<()> {
        self.ensure_mutable()?;
        let key = key.into();
        validate_key(&key)?;
        let is_binary_key = key.ends_with(BINARY_SUFFIX);
        match (&value, is_binary_key) {
            (MetadataValue::Binary(_), true) | (MetadataValue::Ascii(_), false) => {}
            (MetadataValue::Binary(_), false) => {
                return Err(CallError::new(
                    codes::METADATA_INVALID_KEY,
                    "二进制值只能写入以 -bin 结尾的键",
                ));
            }
            (MetadataValue::Ascii(_), true) => {
                return Err(CallError::new(
                    codes::METADATA_INVALID_KEY,
                    "以 -bin 结尾的键只接受二进制值",
                ));
            }
        }
        self.entries.push((key, value));
        Ok(())
    }

    /// 读取同键的最后一个值。
    pub fn get(&self, key: &str) -> Option<&MetadataValue> {
        self.entries
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// 按插入顺序读取同键的全部值。
    pub fn get_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a MetadataValue> + 'a {
        self.entries
            .iter()
            .filter(move |(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// 移除同键的全部条目，返回移除数量。
    ///
    /// # 契约说明（What）
    /// - **错误**：键不合法返回 [`codes::METADATA_INVALID_KEY`]；实例已冻结返回
    ///   [`codes::METADATA_IMMUTABLE`]；键合法但不存在时返回 `Ok(0)`。
    pub fn remove(&mut self, key: &str) -> crate::Result<usize> {
        self.ensure_mutable()?;
        validate_key(key)?;
        let before = self.entries.len();
        self.entries.retain(|(k, _)| k != key);
        Ok(before - self.entries.len())
    }

    /// 冻结实例，之后所有修改操作均失败。幂等。
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    /// 查询是否已冻结。
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// 条目总数。
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 是否为空。
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 按插入顺序遍历全部条目。
    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetadataValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    fn ensure_mutable(&self) -> crate::Result<()> {
        if self.frozen {
            return Err(CallError::new(
                codes::METADATA_IMMUTABLE,
                "元数据已冻结，禁止继续修改",
            ));
        }
        Ok(())
    }
}

fn validate_key(key: &str) -> crate::Result<()> {
    if key.is_empty() {
        return Err(CallError::new(codes::METADATA_INVALID_KEY, "键不能为空"));
    }
    let legal = key
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || matches!(b, b'.' | b'_' | b'-'));
    if !legal {
        return Err(CallError::new(
            codes::METADATA_INVALID_KEY,
            "键只允许小写字母、数字与 ._- 字符",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordered_multi_value_and_last_write_wins() {
        let mut md = Metadata::new();
        md.insert("route", MetadataValue::ascii("a")).unwrap();
        md.insert("route", MetadataValue::ascii("b")).unwrap();
        assert_eq!(md.get("route").and_then(MetadataValue::as_ascii), Some("b"));
        let all: Vec<_> = md
            .get_all("route")
            .filter_map(MetadataValue::as_ascii)
            .collect();
        assert_eq!(all, ["a", "b"]);
    }

    #[test]
    fn binary_suffix_pairs_with_binary_values_only() {
        let mut md = Metadata::new();
        assert!(md.insert("trace-bin", MetadataValue::binary([1u8, 2])).is_ok());
        let err = md
            .insert("trace-bin", MetadataValue::ascii("text"))
            .unwrap_err();
        assert_eq!(err.code(), codes::METADATA_INVALID_KEY);
        let err = md
            .insert("route", MetadataValue::binary([3u8]))
            .unwrap_err();
        assert_eq!(err.code(), codes::METADATA_INVALID_KEY);
    }

    #[test]
    fn uppercase_and_empty_keys_are_rejected() {
        let mut md = Metadata::new();
        assert_eq!(
            md.insert("Route", MetadataValue::ascii("a")).unwrap_err().code(),
            codes::METADATA_INVALID_KEY
        );
        assert_eq!(
            md.insert("", MetadataValue::ascii("a")).unwrap_err().code(),
            codes::METADATA_INVALID_KEY
        );
    }

    #[test]
    fn freeze_blocks_mutation_and_clone_thaws() {
        let mut md = Metadata::new();
        md.insert("route", MetadataValue::ascii("a")).unwrap();
        md.freeze();
        assert_eq!(
            md.insert("route", MetadataValue::ascii("b")).unwrap_err().code(),
            codes::METADATA_IMMUTABLE
        );
        assert_eq!(md.remove("route").unwrap_err().code(), codes::METADATA_IMMUTABLE);

        let mut thawed = md.clone();
        assert!(!thawed.is_frozen());
        thawed.insert("route", MetadataValue::ascii("b")).unwrap();
        assert_eq!(md.len(), 1);
        assert_eq!(thawed.len(), 2);
    }
}
