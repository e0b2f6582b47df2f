//! Integration tests for the stream pipeline

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use gatherpipe::prelude::*;
use tokio::time::timeout;
use tokio_test::{assert_err, assert_ok};

const WORDS: [&str; 6] = ["zero", "one", "two", "three", "four", "five"];

/// Pulls the words in order, skipping "two" and failing in place of "five".
fn word_source() -> impl FnMut() -> std::future::Ready<Result<Option<String>>> + Send + 'static {
    let mut index = 0;
    move || {
        let i = index;
        index += 1;
        let next = match i {
            2 => Err(Error::Skip),
            5 => Err(Error::custom("foo")),
            i if i >= WORDS.len() => Ok(None),
            i => Ok(Some(WORDS[i].to_string())),
        };
        std::future::ready(next)
    }
}

#[tokio::test]
async fn test_piggies() {
    let messages = Arc::new(Mutex::new(Vec::new()));
    let seen = messages.clone();

    let out = pipeline::from_fn(word_source())
        .with_cancellation(CancellationToken::new())
        .with_buffer(2)
        .transform(|word: String| async move {
            if word == "one" {
                Ok(format!("{word} piggy"))
            } else {
                Ok(format!("{word} piggies"))
            }
        })
        .on_error(move |e| seen.lock().unwrap().push(e.to_string()))
        .with_parallelism(2)
        .go();

    let results = timeout(Duration::from_secs(60), out.collect_values())
        .await
        .expect("pipeline finished")
        .unwrap();

    assert_eq!(results.len(), 4);
    let results: HashSet<String> = results.into_iter().collect();
    let expected: HashSet<String> = ["zero piggies", "one piggy", "three piggies", "four piggies"]
        .into_iter()
        .map(String::from)
        .collect();
    assert_eq!(results, expected);

    let messages = messages.lock().unwrap();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("foo"));
}

#[tokio::test]
async fn test_outputs_plus_errors_match_inputs_minus_skips() {
    let reported = Arc::new(AtomicUsize::new(0));
    let counter = reported.clone();

    let mut out = pipeline::from_iter(0..200)
        .transform(|n: i32| async move {
            if n % 7 == 0 {
                Err(Error::custom(format!("{n} failed")))
            } else {
                Ok(n)
            }
        })
        .with_parallelism(4)
        .transform(|n: i32| async move {
            if n % 5 == 0 {
                Err(Error::Skip)
            } else {
                Ok(n * 2)
            }
        })
        .on_error(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .go();

    let mut succeeded = 0;
    while let Some(record) = out.recv().await {
        let value = record.into_result().unwrap();
        assert_ne!(value % 10, 0);
        succeeded += 1;
    }

    let skipped = (0..200).filter(|n| n % 5 == 0 && n % 7 != 0).count();
    assert_eq!(succeeded + reported.load(Ordering::SeqCst), 200 - skipped);
    assert_eq!(reported.load(Ordering::SeqCst), (0..200).filter(|n| n % 7 == 0).count());
}

#[tokio::test]
async fn test_transform_records_carry_their_input() {
    let mut out = pipeline::from_iter(vec!["pathtopr/7/x", "pathtopr/8/x", "pathtopr/12/x"])
        .transform(|path: &'static str| async move {
            let number: u32 = path.split('/').nth(1).unwrap_or_default().parse().map_err(Error::transform)?;
            if number > 10 {
                return Err(Error::Skip);
            }
            Ok(number)
        })
        .go();

    let mut pairs = Vec::new();
    while let Some(record) = out.recv().await {
        let (input, value, error) = record.into_parts();
        assert!(error.is_none());
        pairs.push((input.unwrap(), value.unwrap()));
    }
    assert_eq!(pairs, vec![("pathtopr/7/x", 7), ("pathtopr/8/x", 8)]);
}

#[tokio::test]
async fn test_configuration_is_copy_on_write() {
    let base = pipeline::from_iter(vec![1, 2, 3]);
    let wide = base
        .clone()
        .with_parallelism(4)
        .with_buffer(8)
        .with_parallelism(2);

    assert_eq!(base.config().parallelism(), 1);
    assert_eq!(base.config().buffer_size(), 1);
    assert_eq!(wide.config().parallelism(), 2);
    assert_eq!(wide.config().buffer_size(), 8);

    let doubled = wide.transform(|n: i32| async move { Ok(n * 2) });
    assert_eq!(doubled.config().parallelism(), 2);

    let narrow = doubled.clone().with_parallelism(1);
    assert_eq!(doubled.config().parallelism(), 2);
    assert_eq!(narrow.config().parallelism(), 1);

    assert_eq!(base.go().collect_values().await.unwrap(), vec![1, 2, 3]);
    assert_eq!(narrow.go().collect_values().await.unwrap(), vec![2, 4, 6]);
}

#[tokio::test]
async fn test_with_config_applies_settings() {
    let settings = PipelineConfig::default().buffer_size(100).parallelism(50);
    let stage = pipeline::from_iter(0..3).with_config(settings);

    assert_eq!(stage.config().settings(), settings);
    assert_eq!(stage.go().collect_values().await.unwrap(), vec![0, 1, 2]);
}

#[tokio::test]
async fn test_batch_then_expand_round_trips() {
    let values = pipeline::from_iter(0..10)
        .batch(3)
        .expand()
        .go()
        .collect_values()
        .await
        .unwrap();

    assert_eq!(values, (0..10).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_skip_drops_without_reporting() {
    let reported = Arc::new(AtomicUsize::new(0));
    let counter = reported.clone();

    let values = pipeline::from_iter(vec!["a", "skip", "b"])
        .transform(|s: &'static str| async move {
            if s == "skip" {
                Err(Error::Skip)
            } else {
                Ok(s.to_uppercase())
            }
        })
        .on_error(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .go()
        .collect_values()
        .await
        .unwrap();

    assert_eq!(values, vec!["A".to_string(), "B".to_string()]);
    assert_eq!(reported.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_already_cancelled_pipeline_closes() {
    let token = CancellationToken::new();
    token.cancel();

    let mut out = pipeline::from_iter(0..1_000)
        .with_cancellation(token)
        .transform(|n: i32| async move { Ok(n) })
        .with_parallelism(4)
        .go();

    let received = timeout(Duration::from_secs(5), async move {
        let mut received = Vec::new();
        while let Some(record) = out.recv().await {
            received.push(record);
        }
        received
    })
    .await
    .expect("no worker blocked");

    assert!(received.len() <= 1);
    for record in received {
        assert!(record.error().is_some_and(Error::is_cancelled));
    }
}

#[tokio::test]
async fn test_cancellation_unblocks_full_queues() {
    let token = CancellationToken::new();
    let mut out = pipeline::from_iter(0..1_000)
        .with_cancellation(token.clone())
        .transform(|n: i32| async move { Ok(n) })
        .with_parallelism(3)
        .go();

    // Nobody reads, so every queue fills and every task blocks on a write.
    tokio::time::sleep(Duration::from_millis(20)).await;
    token.cancel();

    let drained = timeout(Duration::from_secs(5), async move {
        let mut drained = 0;
        while out.recv().await.is_some() {
            drained += 1;
        }
        drained
    })
    .await
    .expect("stage closed after cancellation");

    assert!(drained < 1_000);
}

#[tokio::test]
async fn test_setup_failure_yields_one_error() {
    let producer = IterProducer::new(vec![1, 2, 3])
        .with_setup(|| async { Err(Error::custom("fake error")) });
    let mut out = pipeline::from(producer).go();

    let first = out.recv().await.expect("one record");
    assert_eq!(first.error().map(ToString::to_string).as_deref(), Some("fake error"));
    assert!(out.recv().await.is_none());
}

#[tokio::test]
async fn test_from_receiver() {
    let (tx, rx) = tokio::sync::mpsc::channel(4);
    tokio::spawn(async move {
        for i in 0..10 {
            tx.send(Ok(i)).await.unwrap();
        }
        tx.send(Err(Error::Skip)).await.unwrap();
        tx.send(Err(Error::custom("listing failed"))).await.unwrap();
    });

    let reported = Arc::new(AtomicUsize::new(0));
    let counter = reported.clone();
    let mut out = pipeline::from_receiver(rx)
        .with_parallelism(8)
        .transform(|n: u64| async move { Ok(n + 1) })
        .on_error(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .go();

    let mut values = Vec::new();
    while let Some(record) = out.recv().await {
        values.push(record.into_result().unwrap());
    }
    values.sort();
    assert_eq!(values, (1..=10).collect::<Vec<_>>());
    assert_eq!(reported.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_outlet_is_a_stream() {
    use tokio_stream::StreamExt;

    let pages = tokio_stream::iter(vec![Ok(vec!["a", "b"]), Ok(vec!["c"])]);
    let records: Vec<_> = pipeline::from_stream(pages).expand().go().collect().await;

    let values: Vec<&str> = records.into_iter().map(|r| r.into_result().unwrap()).collect();
    assert_eq!(values, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn test_workers_run_concurrently() {
    let barrier = Arc::new(tokio::sync::Barrier::new(4));

    let out = pipeline::from_iter(0..4)
        .transform(move |n: i32| {
            let barrier = barrier.clone();
            async move {
                barrier.wait().await;
                Ok(n)
            }
        })
        .with_parallelism(4)
        .go();

    let mut values = timeout(Duration::from_secs(5), out.collect_values())
        .await
        .expect("four workers were in flight at once")
        .unwrap();
    values.sort();
    assert_eq!(values, vec![0, 1, 2, 3]);
}

#[tokio::test]
async fn test_full_queues_throttle_the_producer() {
    let pulled = Arc::new(AtomicUsize::new(0));
    let counter = pulled.clone();

    let out = pipeline::from_fn(move || {
        let n = counter.fetch_add(1, Ordering::SeqCst);
        async move { Ok(Some(n)) }
    })
    .with_buffer(2)
    .transform(|n: usize| async move { Ok(n) })
    .go();

    tokio::time::sleep(Duration::from_millis(100)).await;

    // Two queued in each stage, plus one in flight in each task.
    assert!(pulled.load(Ordering::SeqCst) <= 6);
    drop(out);
}

#[tokio::test]
async fn test_sink_reports_completions() {
    let mut out = pipeline::from_iter(1..=5)
        .to(|n: i32| async move {
            if n == 3 {
                Err(Error::custom("write failed"))
            } else {
                Ok(())
            }
        })
        .go();

    let mut failed_inputs = Vec::new();
    let mut completions = 0;
    while let Some(done) = out.recv().await {
        completions += 1;
        if !done.is_ok() {
            failed_inputs.push(*done.input().unwrap());
        }
    }
    assert_eq!(completions, 5);
    assert_eq!(failed_inputs, vec![3]);
}

#[tokio::test]
async fn test_sink_finish_aggregates_failures() {
    let saved = Arc::new(Mutex::new(Vec::new()));
    let store = saved.clone();

    let result = pipeline::from_iter(0..10)
        .batch(4)
        .to(move |batch: Vec<i32>| {
            let store = store.clone();
            async move {
                store.lock().unwrap().extend(batch);
                Ok(())
            }
        })
        .go()
        .finish()
        .await;
    let windows = assert_ok!(result);
    assert_eq!(windows, 3);
    assert_eq!(saved.lock().unwrap().len(), 10);

    let result = pipeline::from_iter(0..10)
        .with_parallelism(3)
        .to(|n: i32| async move {
            if n % 4 == 0 {
                Err(Error::custom(format!("row {n} rejected")))
            } else {
                Ok(())
            }
        })
        .go()
        .finish()
        .await;
    let error = assert_err!(result);
    assert_eq!(error.errors().len(), 3);
}

#[tokio::test]
async fn test_failed_window_is_dropped_and_reported() {
    let reported = Arc::new(Mutex::new(Vec::new()));
    let log = reported.clone();

    let saved = pipeline::from_iter(0..6)
        .transform(|n: i32| async move {
            if n == 4 {
                Err(Error::custom("result missing"))
            } else {
                Ok(n)
            }
        })
        .batch(3)
        .to(|_batch: Vec<i32>| async { Ok(()) })
        .on_error(move |e| log.lock().unwrap().push(e))
        .go()
        .finish()
        .await
        .unwrap();

    assert_eq!(saved, 1);
    let reported = reported.lock().unwrap();
    assert_eq!(reported.len(), 1);
    assert_eq!(reported[0].errors().len(), 1);
}

#[tokio::test]
async fn test_cancelling_batch_expand_sink_chain() {
    let token = CancellationToken::new();
    let mut out = pipeline::from_iter(0..10_000)
        .with_cancellation(token.clone())
        .batch(10)
        .expand()
        .with_parallelism(3)
        .to(|_n: i32| async { Ok(()) })
        .go();

    // Nobody reads, so the batch task and every worker end up blocked.
    tokio::time::sleep(Duration::from_millis(20)).await;
    token.cancel();

    let drained = timeout(Duration::from_secs(5), async move {
        let mut drained = 0;
        while out.recv().await.is_some() {
            drained += 1;
        }
        drained
    })
    .await
    .expect("chain closed after cancellation");

    assert!(drained <= 1);
}

#[tokio::test]
async fn test_parallel_expand_keeps_order_within_a_record() {
    let mut out = pipeline::from_iter(0..20)
        .transform(|n: i32| async move { Ok((0..5).map(|k| (n, k)).collect::<Vec<_>>()) })
        .expand()
        .with_parallelism(4)
        .go();

    let mut per_input: std::collections::BTreeMap<i32, Vec<i32>> = Default::default();
    while let Some(record) = out.recv().await {
        let (input, value, error) = record.into_parts();
        assert!(error.is_none());
        let (n, k) = value.unwrap();
        assert_eq!(input, Some(n));
        per_input.entry(n).or_default().push(k);
    }

    assert_eq!(per_input.len(), 20);
    for elements in per_input.values() {
        assert_eq!(elements, &(0..5).collect::<Vec<_>>());
    }
}

#[tokio::test]
async fn test_oversized_buffer_is_usable() {
    let values = pipeline::from_iter(vec![1u64, 2])
        .with_buffer(usize::MAX)
        .transform(|n: u64| async move { Ok(n + 1) })
        .go()
        .collect_values()
        .await
        .unwrap();

    assert_eq!(values, vec![2, 3]);
}

#[tokio::test]
async fn test_huge_batch_size_keeps_every_item() {
    let windows = pipeline::from_iter(vec![1u64, 2, 3])
        .batch(1usize << 60)
        .go()
        .collect_values()
        .await
        .unwrap();

    assert_eq!(windows, vec![vec![1, 2, 3]]);
}
