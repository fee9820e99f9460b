use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use sqlite_mapper::prelude::*;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq)]
struct Job {
    id: i64,
    name: String,
}

impl Job {
    fn new(name: impl Into<String>) -> Self {
        Self {
            id: 0,
            name: name.into(),
        }
    }
}

impl Entity for Job {
    fn describe() -> TableSpec {
        TableSpec::for_type::<Self>()
            .column(ColumnSpec::of::<i64>("Id").primary_key().auto_increment())
            .column(ColumnSpec::of::<String>("Name").not_null())
    }

    fn to_values(&self) -> Vec<(&'static str, Value)> {
        vec![("Id", self.id.into_value()), ("Name", self.name.clone().into_value())]
    }

    fn from_row(row: &Row) -> Result<Self, MapperError> {
        Ok(Self {
            id: row.get("Id")?,
            name: row.get("Name")?,
        })
    }

    fn set_auto_id(&mut self, id: i64) {
        self.id = id;
    }
}

async fn open() -> Result<AsyncConnection, MapperError> {
    let conn = AsyncConnection::open(ConnectionOptions::in_memory()).await?;
    conn.create_table::<Job>(CreateFlags::NONE).await?;
    Ok(conn)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_inserts_are_serialized() -> Result<(), MapperError> {
    let conn = open().await?;
    conn.insert(Job::new("first")).await?;

    let errors = Arc::new(AtomicUsize::new(0));
    let mut handles = Vec::with_capacity(500);
    for i in 0..500 {
        let conn = conn.clone();
        let errors = Arc::clone(&errors);
        handles.push(tokio::spawn(async move {
            if conn.insert(Job::new(format!("job-{i}"))).await.is_err() {
                errors.fetch_add(1, Ordering::SeqCst);
            }
        }));
    }
    for handle in handles {
        handle.await.expect("task panicked");
    }

    assert_eq!(errors.load(Ordering::SeqCst), 0);
    assert_eq!(conn.table::<Job>().count().await?, 501);
    conn.close().await
}

#[tokio::test(flavor = "multi_thread")]
async fn async_crud_and_queries() -> Result<(), MapperError> {
    let conn = open().await?;
    let inserted = conn
        .insert_all(vec![Job::new("a"), Job::new("b"), Job::new("c")])
        .await?;
    assert_eq!(inserted.iter().map(|j| j.id).collect::<Vec<_>>(), vec![1, 2, 3]);

    let mut b: Job = conn.get(2_i64).await?;
    b.name = "bee".into();
    assert_eq!(conn.update(b).await?, 1);
    assert_eq!(conn.find::<Job, _>(2_i64).await?.map(|j| j.name), Some("bee".to_owned()));
    assert!(conn.find::<Job, _>(42_i64).await?.is_none());
    assert!(conn.get::<Job, _>(42_i64).await.unwrap_err().is_not_found());

    let names = conn
        .table::<Job>()
        .filter(col("Name").starts_with("b"))
        .order_by_desc("Id")
        .to_vec()
        .await?;
    assert_eq!(names.len(), 1);
    assert_eq!(conn.table::<Job>().max::<i64>("Id").await?, Some(3));

    assert_eq!(conn.delete_by_key::<Job, _>(1_i64).await?, 1);
    assert_eq!(conn.table::<Job>().count().await?, 2);

    let depth = conn
        .run_in_transaction(|c| {
            c.insert(&mut Job::new("in tx"))?;
            Ok(c.transaction_depth())
        })
        .await?;
    assert_eq!(depth, 1);
    assert_eq!(conn.transaction_depth().await?, 0);
    assert_eq!(conn.delete_all::<Job>().await?, 3);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn cancelled_calls_do_not_run() -> Result<(), MapperError> {
    let conn = open().await?;

    let token = CancellationToken::new();
    token.cancel();
    let result = conn
        .with_connection_cancellable(token, |c| {
            c.insert(&mut Job::new("never"))?;
            Ok(())
        })
        .await;
    assert!(matches!(result, Err(MapperError::Cancelled)));
    assert_eq!(conn.table::<Job>().count().await?, 0);

    // A slow call occupies the worker while more calls queue behind it.
    let slow = {
        let conn = conn.clone();
        tokio::spawn(async move {
            conn.with_connection(|_| {
                std::thread::sleep(Duration::from_millis(200));
                Ok(())
            })
            .await
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    let queued = {
        let conn = conn.clone();
        tokio::spawn(async move { conn.insert(Job::new("queued")).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    conn.close().await?;
    slow.await.expect("slow task")?;
    assert!(matches!(queued.await.expect("queued task"), Err(MapperError::Cancelled)));

    assert!(conn.table::<Job>().count().await.is_err());
    conn.close().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn listeners_run_on_the_worker() -> Result<(), MapperError> {
    let conn = open().await?;
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    conn.on_table_changed(move |event| {
        if event.table == "Job" && event.action == ChangeAction::Insert {
            counter.fetch_add(event.rows, Ordering::SeqCst);
        }
    })
    .await?;
    conn.insert(Job::new("x")).await?;
    conn.insert(Job::new("y")).await?;
    assert_eq!(seen.load(Ordering::SeqCst), 2);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn busy_commit_through_the_facade() -> Result<(), MapperError> {
    let dir = tempfile::tempdir().map_err(MapperError::Io)?;
    let path = dir.path().join("async-busy.db").to_string_lossy().into_owned();
    let options = ConnectionOptions::new(path)
        .with_journal_mode(JournalMode::Delete)
        .with_busy_timeout(Duration::from_millis(20));

    let writer = AsyncConnection::open(options.clone()).await?;
    writer.create_table::<Job>(CreateFlags::NONE).await?;
    let reader = AsyncConnection::open(options).await?;
    reader
        .with_connection(|c| {
            c.begin_transaction()?;
            c.execute_scalar::<i64>(r#"SELECT count(*) FROM "Job""#, &[])
        })
        .await?;

    let err = writer
        .run_in_transaction(|c| {
            c.insert(&mut Job::new("blocked"))?;
            Ok(())
        })
        .await
        .unwrap_err();
    assert!(err.is_busy(), "{err}");
    assert!(matches!(err, MapperError::Transaction { .. }));
    assert_eq!(writer.transaction_depth().await?, 0);

    reader.with_connection(|c| c.commit()).await?;
    writer.insert(Job::new("after")).await?;
    assert_eq!(writer.table::<Job>().count().await?, 1);
    Ok(())
}
