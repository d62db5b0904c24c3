//! 论坛短ID分配与引用解析

use std::sync::Arc;

use application::{
    ApplicationError, CreateReplyRequest, CreateThreadRequest, ForumService,
    ForumServiceDependencies, InMemoryStore, PostRepository, ShortIdAllocator, SystemClock,
};
use domain::ShortId;
use rand::rngs::StdRng;
use rand::SeedableRng;

fn forum(store: &Arc<InMemoryStore>, allocator: ShortIdAllocator) -> ForumService {
    ForumService::new(ForumServiceDependencies {
        post_repository: store.clone(),
        short_ids: Arc::new(allocator),
        clock: Arc::new(SystemClock),
    })
}

fn seeded(store: &Arc<InMemoryStore>, seed: u64, attempts: u32) -> ShortIdAllocator {
    ShortIdAllocator::with_rng(store.clone(), attempts, StdRng::seed_from_u64(seed))
}

fn thread_request(content: &str) -> CreateThreadRequest {
    CreateThreadRequest {
        board: "b".to_string(),
        subject: Some("hello".to_string()),
        content: content.to_string(),
        author_name: None,
    }
}

fn reply_request(content: &str, reply_to_id: Option<uuid::Uuid>) -> CreateReplyRequest {
    CreateReplyRequest {
        content: content.to_string(),
        author_name: None,
        reply_to_id,
    }
}

#[tokio::test]
async fn colliding_generators_never_duplicate_across_threads_and_replies() {
    let store = Arc::new(InMemoryStore::new());
    // 同一种子的两个分配器产生完全相同的候选序列
    let threads = forum(&store, seeded(&store, 99, 16));
    let replies = forum(&store, seeded(&store, 99, 16));

    let op = threads.create_thread(thread_request("first")).await.unwrap();
    let reply = replies
        .create_reply(op.id, reply_request("second", None))
        .await
        .unwrap();

    assert_ne!(op.short_id, reply.short_id);
    assert!(store.short_id_exists(&op.short_id).await.unwrap());
    assert!(store.short_id_exists(&reply.short_id).await.unwrap());

    let second_op = replies.create_thread(thread_request("third")).await.unwrap();
    let mut seen = vec![op.short_id, reply.short_id, second_op.short_id];
    seen.sort();
    seen.dedup();
    assert_eq!(seen.len(), 3);
}

#[tokio::test]
async fn allocation_gives_up_after_bounded_attempts() {
    let store = Arc::new(InMemoryStore::new());
    let first = forum(&store, seeded(&store, 7, 1));
    first.create_thread(thread_request("op")).await.unwrap();

    // 只允许一次尝试，而且第一个候选已经被占用
    let second = forum(&store, seeded(&store, 7, 1));
    let result = second.create_thread(thread_request("again")).await;
    assert!(matches!(
        result,
        Err(ApplicationError::ShortIdExhausted { attempts: 1 })
    ));
}

#[tokio::test]
async fn replies_collect_quotes_and_explicit_target() {
    let store = Arc::new(InMemoryStore::new());
    let service = forum(&store, ShortIdAllocator::new(store.clone(), 16));

    let op = service.create_thread(thread_request("op post")).await.unwrap();
    let first = service
        .create_reply(op.id, reply_request("first reply", None))
        .await
        .unwrap();
    assert!(first.reply_to.is_empty());

    let content = format!(">>{} agreed, also >>{} and >>{}", first.short_id, op.short_id, first.short_id);
    let second = service
        .create_reply(op.id, reply_request(&content, Some(op.id.as_uuid())))
        .await
        .unwrap();
    assert_eq!(second.reply_to, vec![first.short_id.clone(), op.short_id.clone()]);

    // 其他主题的回复不能作为显式引用目标
    let other_op = service.create_thread(thread_request("other")).await.unwrap();
    let third = service
        .create_reply(other_op.id, reply_request("hmm", Some(first.id.as_uuid())))
        .await
        .unwrap();
    assert!(third.reply_to.is_empty());

    let fourth = service
        .create_reply(op.id, reply_request("reply to first", Some(first.id.as_uuid())))
        .await
        .unwrap();
    assert_eq!(fourth.reply_to, vec![first.short_id]);
}

#[tokio::test]
async fn rejects_empty_content_and_unknown_thread() {
    let store = Arc::new(InMemoryStore::new());
    let service = forum(&store, ShortIdAllocator::new(store.clone(), 16));

    assert!(service.create_thread(thread_request("  ")).await.is_err());
    let missing = service
        .create_reply(domain::ThreadId::random(), reply_request("hi", None))
        .await;
    assert!(matches!(
        missing,
        Err(ApplicationError::Domain(domain::DomainError::ThreadNotFound))
    ));
}

#[test]
fn short_id_alphabet_is_lowercase_alphanumeric() {
    assert!(ShortId::ALPHABET.iter().copied().all(ShortId::is_symbol));
}
