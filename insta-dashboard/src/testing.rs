//! Фейковый backend и фабрики данных для модульных тестов.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use insta_client::{
    Category, DashboardData, InstaClientError, InstaClientResult, MediaType, Pagination, Post,
    PostsTable, Subcategory, TableQuery,
};
use tokio::sync::oneshot;

use crate::api::DashboardApi;

pub(crate) fn ts(seconds: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(seconds, 0)
        .single()
        .expect("valid timestamp")
}

pub(crate) fn post(id: &str) -> Post {
    Post {
        id: id.to_string(),
        caption: None,
        media_type: MediaType::Image,
        published_at: ts(1_700_000_000),
        metrics_updated_at: None,
        category_id: None,
        subcategory_id: None,
        views: 0,
        likes: 0,
        comments: 0,
        saves: 0,
        shares: 0,
    }
}

pub(crate) fn category(id: &str, color_index: u32) -> Category {
    Category {
        id: id.to_string(),
        name: format!("category {id}"),
        color_index,
    }
}

pub(crate) fn subcategory(id: &str, category_id: &str) -> Subcategory {
    Subcategory {
        id: id.to_string(),
        name: format!("subcategory {id}"),
        category_id: category_id.to_string(),
    }
}

pub(crate) fn table(posts: Vec<Post>, page: u32, total_pages: u32) -> PostsTable {
    let total = posts.len() as u64;
    PostsTable {
        posts,
        categories: vec![category("c1", 0), category("c2", 1)],
        subcategories: vec![subcategory("s1", "c1"), subcategory("s2", "c2")],
        pagination: Pagination {
            page,
            total_pages,
            total,
        },
    }
}

pub(crate) fn fetch_error(message: &str) -> InstaClientError {
    InstaClientError::Fetch {
        status: 500,
        message: message.to_string(),
    }
}

pub(crate) enum Scripted<T> {
    Ready(InstaClientResult<T>),
    Gated(oneshot::Receiver<()>, InstaClientResult<T>),
}

impl<T> Scripted<T> {
    async fn resolve(self) -> InstaClientResult<T> {
        match self {
            Self::Ready(result) => result,
            Self::Gated(gate, result) => {
                let _ = gate.await;
                result
            }
        }
    }
}

#[derive(Default)]
pub(crate) struct FakeApi {
    pub(crate) tables: Mutex<VecDeque<Scripted<PostsTable>>>,
    pub(crate) dashboards: Mutex<VecDeque<InstaClientResult<DashboardData>>>,
    pub(crate) queries: Mutex<Vec<TableQuery>>,
    pub(crate) calls: Mutex<Vec<String>>,
    pub(crate) fail_sync: AtomicBool,
    pub(crate) fail_assign: AtomicBool,
    pub(crate) assign_gate: Mutex<Option<oneshot::Receiver<()>>>,
}

impl FakeApi {
    pub(crate) fn push_table(&self, result: InstaClientResult<PostsTable>) {
        self.tables
            .lock()
            .expect("lock")
            .push_back(Scripted::Ready(result));
    }

    pub(crate) fn push_gated_table(&self, result: InstaClientResult<PostsTable>) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.tables
            .lock()
            .expect("lock")
            .push_back(Scripted::Gated(rx, result));
        tx
    }

    pub(crate) fn push_dashboard(&self, result: InstaClientResult<DashboardData>) {
        self.dashboards.lock().expect("lock").push_back(result);
    }

    pub(crate) fn gate_assign(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.assign_gate.lock().expect("lock") = Some(rx);
        tx
    }

    pub(crate) fn queries(&self) -> Vec<TableQuery> {
        self.queries.lock().expect("lock").clone()
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("lock").clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().expect("lock").push(call);
    }

    async fn assign(&self, call: String) -> InstaClientResult<()> {
        self.record(call);
        let gate = self.assign_gate.lock().expect("lock").take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        if self.fail_assign.load(Ordering::SeqCst) {
            return Err(fetch_error("assignment rejected"));
        }
        Ok(())
    }
}

#[async_trait]
impl DashboardApi for FakeApi {
    async fn fetch_table(&self, username: &str, query: &TableQuery) -> InstaClientResult<PostsTable> {
        self.record(format!("table:{username}:{}", query.page));
        self.queries.lock().expect("lock").push(query.clone());
        let scripted = self.tables.lock().expect("lock").pop_front();
        match scripted {
            Some(scripted) => scripted.resolve().await,
            None => Ok(table(Vec::new(), query.page.max(1), 1)),
        }
    }

    async fn fetch_dashboard(&self, username: &str) -> InstaClientResult<DashboardData> {
        self.record(format!("dashboard:{username}"));
        let scripted = self.dashboards.lock().expect("lock").pop_front();
        scripted.unwrap_or_else(|| {
            Ok(DashboardData {
                posts: Vec::new(),
                categories: Vec::new(),
                subcategories: Vec::new(),
            })
        })
    }

    async fn sync_posts(&self, username: &str) -> InstaClientResult<()> {
        self.record(format!("sync:{username}"));
        if self.fail_sync.load(Ordering::SeqCst) {
            return Err(fetch_error("sync failed"));
        }
        Ok(())
    }

    async fn assign_category(
        &self,
        username: &str,
        post_id: &str,
        category_id: Option<&str>,
    ) -> InstaClientResult<()> {
        self.assign(format!(
            "category:{username}:{post_id}:{}",
            category_id.unwrap_or("null")
        ))
        .await
    }

    async fn assign_subcategory(
        &self,
        username: &str,
        post_id: &str,
        subcategory_id: Option<&str>,
    ) -> InstaClientResult<()> {
        self.assign(format!(
            "subcategory:{username}:{post_id}:{}",
            subcategory_id.unwrap_or("null")
        ))
        .await
    }
}
