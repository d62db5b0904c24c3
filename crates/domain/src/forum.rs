//! 论坛帖子：主题（OP）与回复，以及 `>>shortid` 引用解析

use serde::{Deserialize, Serialize};

use crate::value_objects::{ReplyId, ShortId, ThreadId, Timestamp};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thread {
    pub id: ThreadId,
    pub board: String,
    pub short_id: ShortId,
    pub subject: Option<String>,
    pub content: String,
    pub author_name: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reply {
    pub id: ReplyId,
    pub thread_id: ThreadId,
    pub short_id: ShortId,
    pub content: String,
    pub author_name: Option<String>,
    /// 被引用帖子的短ID，按首次出现顺序去重
    pub reply_to: Vec<ShortId>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: Timestamp,
}

const QUOTE_MARKER: &[u8] = b">>";

/// 提取正文里的 `>>xxxxxx` 引用。
///
/// 标记后紧跟 6 个短ID字符即视为一次引用，匹配后从引用末尾继续扫描。
pub fn extract_quotes(content: &str) -> Vec<ShortId> {
    let bytes = content.as_bytes();
    let span = QUOTE_MARKER.len() + ShortId::LEN;
    let mut quotes: Vec<ShortId> = Vec::new();
    let mut pos = 0;

    while pos + span <= bytes.len() {
        let candidate = &bytes[pos + QUOTE_MARKER.len()..pos + span];
        if bytes[pos..].starts_with(QUOTE_MARKER) && candidate.iter().copied().all(ShortId::is_symbol)
        {
            // 候选片段全是 ASCII，切片边界一定落在字符边界上
            if let Ok(id) = ShortId::parse(&content[pos + QUOTE_MARKER.len()..pos + span]) {
                if !quotes.contains(&id) {
                    quotes.push(id);
                }
            }
            pos += span;
        } else {
            pos += 1;
        }
    }

    quotes
}
