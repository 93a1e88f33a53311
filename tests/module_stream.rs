mod common;

use futures::StreamExt;
use futures::stream::FusedStream;

use common::{counter, instantiate};

#[tokio::test]
async fn stream_yields_items_in_order_then_ends() {
    let api = instantiate();
    let stream = api.call_stream::<_, u32>("__count", 5i32).unwrap();

    let items: Vec<u32> = stream.map(|item| item.unwrap()).collect().await;

    assert_eq!(items, vec![1, 2, 3, 4, 5]);
    assert_eq!(counter(&api, "drops"), 1);
    assert!(api.registry().is_empty());
}

#[tokio::test]
async fn empty_stream_ends_without_items() {
    let api = instantiate();
    let mut stream = api.call_stream::<_, u32>("__count", 0i32).unwrap();

    assert!(stream.next().await.is_none());
    assert!(stream.is_terminated());
    assert_eq!(counter(&api, "drops"), 1);
}

#[tokio::test]
async fn stream_polls_module_only_on_demand() {
    let api = instantiate();
    let mut stream = api.call_stream::<_, u32>("__count", 100i32).unwrap();
    assert_eq!(counter(&api, "polls"), 1);

    assert_eq!(stream.next().await.unwrap().unwrap(), 1);
    assert_eq!(counter(&api, "polls"), 1);
    assert_eq!(stream.next().await.unwrap().unwrap(), 2);
    assert_eq!(stream.next().await.unwrap().unwrap(), 3);
    assert_eq!(counter(&api, "polls"), 3);

    let (next, done) = stream.slots();
    drop(stream);
    assert_eq!(counter(&api, "drops"), 1);
    assert!(!api.registry().is_registered(next));
    assert!(!api.registry().is_registered(done));
}

#[tokio::test]
async fn stream_can_be_consumed_on_another_task() {
    let api = instantiate();
    let stream = api.call_stream::<_, i32>("__count", 3i32).unwrap();

    let total = tokio::spawn(stream.fold(0, |sum, item| async move { sum + item.unwrap() }))
        .await
        .unwrap();

    assert_eq!(total, 6);
    assert_eq!(counter(&api, "drops"), 1);
}
