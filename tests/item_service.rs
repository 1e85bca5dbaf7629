use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sharelist::application::items::{
    CreateItemCommand, ItemService, ItemServiceError, UpdateItemCommand,
};
use sharelist::application::notify::{ChangeFeed, ChangeNotifier};
use sharelist::application::repos::{CreateItemParams, ItemsRepo};
use sharelist::cache::{CacheConfig, CacheError, CacheKey, MemoryCache, SnapshotCache};
use sharelist::domain::entities::ItemId;
use sharelist::infra::memory::MemoryRepositories;

struct Fixture {
    service: Arc<ItemService>,
    repos: Arc<MemoryRepositories>,
    cache: Arc<MemoryCache>,
    _feed: ChangeFeed,
}

fn fixture_with_ttl(ttl: Duration) -> Fixture {
    let repos = Arc::new(MemoryRepositories::new());
    let cache = Arc::new(MemoryCache::new(&CacheConfig::default()));
    let (notifier, feed) = ChangeNotifier::channel();
    let service = ItemService::new(repos.clone(), repos.clone(), notifier)
        .with_cache(cache.clone(), ttl);
    Fixture {
        service: Arc::new(service),
        repos,
        cache,
        _feed: feed,
    }
}

fn fixture() -> Fixture {
    fixture_with_ttl(Duration::from_secs(600))
}

async fn create_item(service: &ItemService, title: &str) -> ItemId {
    service
        .create(
            1,
            CreateItemCommand {
                title: title.to_string(),
                completed: false,
            },
        )
        .await
        .expect("create item")
        .id
}

async fn like_count(service: &ItemService, item_id: ItemId) -> i64 {
    service
        .snapshot()
        .await
        .expect("snapshot")
        .into_iter()
        .find(|record| record.id == item_id)
        .map(|record| record.like_count)
        .expect("item present")
}

#[tokio::test]
async fn liking_twice_counts_once() {
    let fx = fixture();
    let item = create_item(&fx.service, "Test Todo").await;

    let first = fx.service.like_by_user(item, 1).await.expect("first like");
    let second = fx.service.like_by_user(item, 1).await.expect("second like");

    assert!(first.changed);
    assert!(!second.changed);
    assert!(second.liked);
    assert_eq!(second.like_count, 1);
    assert_eq!(like_count(&fx.service, item).await, 1);
    assert_eq!(fx.repos.like_relationships(item), 1);
}

#[tokio::test]
async fn unliking_without_a_like_is_a_no_op() {
    let fx = fixture();
    let item = create_item(&fx.service, "Test Todo").await;

    let outcome = fx.service.unlike_by_user(item, 1).await.expect("unlike");

    assert!(!outcome.changed);
    assert!(!outcome.liked);
    assert_eq!(outcome.like_count, 0);
    assert_eq!(like_count(&fx.service, item).await, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_likes_and_unlikes_keep_exact_counts() {
    let fx = fixture();
    let item = create_item(&fx.service, "Test Todo").await;

    let likes: Vec<_> = (1..=10)
        .map(|user_id| {
            let service = fx.service.clone();
            tokio::spawn(async move { service.like_by_user(item, user_id).await })
        })
        .collect();
    for handle in likes {
        assert!(handle.await.expect("join").expect("like").changed);
    }

    assert_eq!(like_count(&fx.service, item).await, 10);
    assert_eq!(fx.repos.like_relationships(item), 10);

    let unlikes: Vec<_> = (1..=10)
        .map(|user_id| {
            let service = fx.service.clone();
            tokio::spawn(async move { service.unlike_by_user(item, user_id).await })
        })
        .collect();
    for handle in unlikes {
        assert!(handle.await.expect("join").expect("unlike").changed);
    }

    assert_eq!(like_count(&fx.service, item).await, 0);
    assert_eq!(fx.repos.like_relationships(item), 0);
    assert_eq!(fx.service.contended_items(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn interleaved_like_unlike_pairs_converge_to_zero() {
    let fx = fixture();
    let item = create_item(&fx.service, "Test Todo").await;

    let mut handles = Vec::new();
    for user_id in 1..=10 {
        let service = fx.service.clone();
        handles.push(tokio::spawn(async move {
            service.like_by_user(item, user_id).await.map(|_| ())
        }));

        // The unlike may land before the like; an absent like is a no-op, so retry.
        let service = fx.service.clone();
        handles.push(tokio::spawn(async move {
            for _ in 0..200 {
                if service.unlike_by_user(item, user_id).await?.changed {
                    return Ok::<(), ItemServiceError>(());
                }
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
            panic!("unlike for user {user_id} never observed the like");
        }));
    }
    for handle in handles {
        handle.await.expect("join").expect("like or unlike");
    }

    assert_eq!(like_count(&fx.service, item).await, 0);
    assert_eq!(fx.repos.like_relationships(item), 0);
    for user_id in 1..=10 {
        assert!(!fx.service.has_liked(item, user_id).await.expect("has_liked"));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sequential_like_unlike_per_user_ends_unliked() {
    let fx = fixture();
    let item = create_item(&fx.service, "Test Todo").await;

    let pairs: Vec<_> = (1..=10)
        .map(|user_id| {
            let service = fx.service.clone();
            tokio::spawn(async move {
                service.like_by_user(item, user_id).await?;
                tokio::task::yield_now().await;
                service.unlike_by_user(item, user_id).await
            })
        })
        .collect();
    for handle in pairs {
        let outcome = handle.await.expect("join").expect("pair");
        assert!(!outcome.liked);
    }

    assert_eq!(like_count(&fx.service, item).await, 0);
    assert_eq!(fx.repos.like_relationships(item), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_same_user_likes_write_once() {
    let fx = fixture();
    let item = create_item(&fx.service, "Test Todo").await;

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let service = fx.service.clone();
            tokio::spawn(async move { service.like_by_user(item, 7).await })
        })
        .collect();

    let mut changed = 0;
    for handle in handles {
        if handle.await.expect("join").expect("like").changed {
            changed += 1;
        }
    }

    assert_eq!(changed, 1);
    assert_eq!(like_count(&fx.service, item).await, 1);
}

#[tokio::test]
async fn list_reflects_create_after_cached_read() {
    let fx = fixture();
    create_item(&fx.service, "First").await;

    let before = fx.service.list(1).await.expect("list");
    assert_eq!(before.len(), 1);
    assert_eq!(fx.cache.len(), 1);

    create_item(&fx.service, "Second").await;
    let after = fx.service.list(1).await.expect("list");
    assert_eq!(after.len(), before.len() + 1);
}

#[tokio::test]
async fn list_reflects_update_and_delete() {
    let fx = fixture();
    let first = create_item(&fx.service, "First").await;
    let second = create_item(&fx.service, "Second").await;
    fx.service.list(1).await.expect("warm cache");

    fx.service
        .update(
            first,
            UpdateItemCommand {
                title: "First, renamed".to_string(),
                completed: true,
            },
        )
        .await
        .expect("update");
    fx.service.delete(second).await.expect("delete");

    let items = fx.service.list(1).await.expect("list");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].record.title, "First, renamed");
    assert!(items[0].record.completed);
}

#[tokio::test]
async fn expired_list_falls_back_to_store() {
    let fx = fixture_with_ttl(Duration::from_millis(50));
    create_item(&fx.service, "First").await;
    assert_eq!(fx.service.list(1).await.expect("list").len(), 1);

    // Written around the service, so only expiry can surface it.
    fx.repos
        .create_item(CreateItemParams {
            owner_id: 2,
            title: "Behind the cache".to_string(),
            completed: false,
        })
        .await
        .expect("direct create");
    assert_eq!(fx.service.list(1).await.expect("cached list").len(), 1);

    tokio::time::sleep(Duration::from_millis(120)).await;
    assert!(
        fx.cache
            .get(CacheKey::ItemList.as_str())
            .await
            .expect("cache get")
            .is_none()
    );
    assert_eq!(fx.service.list(1).await.expect("fresh list").len(), 2);
}

#[tokio::test]
async fn like_on_deleted_item_is_not_found() {
    let fx = fixture();
    let item = create_item(&fx.service, "Short lived").await;
    fx.service.delete(item).await.expect("delete");

    let err = fx
        .service
        .like_by_user(item, 1)
        .await
        .expect_err("deleted item");
    assert!(err.is_not_found());
}

#[tokio::test]
async fn like_state_is_per_viewer() {
    let fx = fixture();
    let item = create_item(&fx.service, "Test Todo").await;

    let items = fx.service.list(1).await.expect("list");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].record.like_count, 0);

    fx.service.like_by_user(item, 1).await.expect("like");

    let mine = fx.service.list(1).await.expect("list for user 1");
    assert_eq!(mine[0].record.like_count, 1);
    assert!(mine[0].user_has_liked);

    let theirs = fx.service.list(2).await.expect("list for user 2");
    assert_eq!(theirs[0].record.like_count, 1);
    assert!(!theirs[0].user_has_liked);
}

/// Delays every `set` so a mutation can land while a cache write is in flight.
struct SlowSetCache {
    inner: MemoryCache,
    delay: Duration,
}

#[async_trait]
impl SnapshotCache for SlowSetCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        tokio::time::sleep(self.delay).await;
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.inner.delete(key).await
    }

    fn backend(&self) -> &'static str {
        "slow"
    }
}

#[tokio::test]
async fn mutation_during_cache_write_is_not_masked() {
    let repos = Arc::new(MemoryRepositories::new());
    let cache = Arc::new(SlowSetCache {
        inner: MemoryCache::new(&CacheConfig::default()),
        delay: Duration::from_millis(100),
    });
    let (notifier, _feed) = ChangeNotifier::channel();
    let service = Arc::new(
        ItemService::new(repos.clone(), repos, notifier)
            .with_cache(cache.clone(), Duration::from_secs(600)),
    );
    create_item(&service, "First").await;

    let reader = {
        let service = service.clone();
        tokio::spawn(async move { service.list(1).await })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;
    create_item(&service, "Second").await;

    assert_eq!(reader.await.expect("join").expect("list").len(), 1);
    assert!(
        cache
            .get(CacheKey::ItemList.as_str())
            .await
            .expect("cache get")
            .is_none(),
        "write that raced the create must not survive"
    );
    assert_eq!(service.list(1).await.expect("list after create").len(), 2);
}
