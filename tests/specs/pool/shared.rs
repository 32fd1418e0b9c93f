//! Shared session pool specs
//!
//! Verify sharing within the max-age window and replacement after it.

use crate::prelude::*;

#[tokio::test]
async fn sessions_are_shared_until_max_age() {
    let factory = FakeSessionFactory::new();
    let clock = FakeClock::new();
    let pool = SharedConnectionPool::new(
        factory.clone(),
        Duration::from_secs(10),
        Duration::from_secs(5),
        clock.clone(),
    );
    let descriptor = SessionDescriptor::new("zk1:2181");
    let cancel = CancellationToken::new();

    let first = pool.acquire(&descriptor, &cancel).await.unwrap();
    first.release().await;
    let second = pool.acquire(&descriptor, &cancel).await.unwrap();
    assert!(Arc::ptr_eq(first.session(), second.session()));

    clock.advance(Duration::from_secs(10));
    second.release().await;
    assert!(second.session().is_closed());

    let third = pool.acquire(&descriptor, &cancel).await.unwrap();
    assert!(!Arc::ptr_eq(second.session(), third.session()));
    assert_eq!(factory.connect_count(), 2);
    third.release().await;
}
