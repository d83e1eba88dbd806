//! Оптимистичные изменения постов с откатом при ошибке.

use std::future::Future;

use insta_client::{InstaClientError, InstaClientResult, Post};

use crate::api::DashboardApi;
use crate::store::PostCollectionStore;

#[derive(Debug)]
/// Итог оптимистичной операции.
pub enum MutationOutcome<T> {
    /// Сервер подтвердил изменение; локальное состояние оставлено как есть.
    Confirmed(T),
    /// Сервер отказал; локальные посты восстановлены из снимка.
    RolledBack(InstaClientError),
}

impl<T> MutationOutcome<T> {
    /// `true`, если изменение подтверждено.
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed(_))
    }

    /// Переводит итог в обычный `Result`.
    pub fn into_result(self) -> InstaClientResult<T> {
        match self {
            Self::Confirmed(value) => Ok(value),
            Self::RolledBack(err) => Err(err),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
/// Проверка подкатегории при назначении посту.
pub enum SubcategoryPolicy {
    /// Подкатегория назначается как есть, даже если её родитель не совпадает
    /// с категорией поста.
    #[default]
    Permissive,
    /// Родитель подкатегории обязан совпадать с текущей категорией поста.
    RequireMatchingParent,
}

/// Применяет `mutate` к постам сразу, затем ждёт `remote`.
///
/// При ошибке `remote` посты целиком заменяются снимком, снятым до `mutate`.
/// Если за это время коллекцию полностью перезагрузили, откат пропускается:
/// свежие данные сервера важнее старого снимка.
pub async fn apply_then_confirm<A, T, M, F>(
    store: &PostCollectionStore<A>,
    mutate: M,
    remote: F,
) -> MutationOutcome<T>
where
    A: DashboardApi,
    M: FnOnce(&mut Vec<Post>),
    F: Future<Output = InstaClientResult<T>>,
{
    let snapshot = store.read(|state| state.posts.clone());
    let (_, generation) = store.modify_posts(mutate);

    match remote.await {
        Ok(value) => MutationOutcome::Confirmed(value),
        Err(err) => {
            if store.restore_posts(generation, snapshot) {
                tracing::warn!(error = %err, "remote mutation failed, local changes rolled back");
            } else {
                tracing::warn!(error = %err, "remote mutation failed after reload, rollback skipped");
            }
            MutationOutcome::RolledBack(err)
        }
    }
}

fn require_username(username: Option<&str>) -> InstaClientResult<&str> {
    username
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or(InstaClientError::AuthRequired)
}

/// Назначает посту категорию (`None` снимает её).
///
/// Подкатегория поста сбрасывается: она может не принадлежать новой категории.
/// `Err` означает, что изменение не применялось вовсе.
pub async fn assign_category<A: DashboardApi>(
    store: &PostCollectionStore<A>,
    username: Option<&str>,
    post_id: &str,
    category_id: Option<&str>,
) -> InstaClientResult<MutationOutcome<()>> {
    let username = require_username(username)?;
    let api = store.api().clone();

    let outcome = apply_then_confirm(
        store,
        |posts| {
            if let Some(post) = posts.iter_mut().find(|p| p.id == post_id) {
                post.category_id = category_id.map(str::to_string);
                post.subcategory_id = None;
            }
        },
        api.assign_category(username, post_id, category_id),
    )
    .await;
    Ok(outcome)
}

/// Назначает посту подкатегорию (`None` снимает её); категория не меняется.
///
/// При [`SubcategoryPolicy::RequireMatchingParent`] подкатегория должна быть
/// известна хранилищу и принадлежать текущей категории поста.
pub async fn assign_subcategory<A: DashboardApi>(
    store: &PostCollectionStore<A>,
    username: Option<&str>,
    post_id: &str,
    subcategory_id: Option<&str>,
    policy: SubcategoryPolicy,
) -> InstaClientResult<MutationOutcome<()>> {
    let username = require_username(username)?;
    if let (SubcategoryPolicy::RequireMatchingParent, Some(subcategory_id)) = (policy, subcategory_id) {
        store.read(|state| check_parent(state, post_id, subcategory_id))?;
    }
    let api = store.api().clone();

    let outcome = apply_then_confirm(
        store,
        |posts| {
            if let Some(post) = posts.iter_mut().find(|p| p.id == post_id) {
                post.subcategory_id = subcategory_id.map(str::to_string);
            }
        },
        api.assign_subcategory(username, post_id, subcategory_id),
    )
    .await;
    Ok(outcome)
}

fn check_parent(
    state: &crate::store::CollectionState,
    post_id: &str,
    subcategory_id: &str,
) -> InstaClientResult<()> {
    let subcategory = state.subcategory(subcategory_id).ok_or_else(|| {
        InstaClientError::Validation(format!("unknown subcategory '{subcategory_id}'"))
    })?;
    let post_category = state.post(post_id).and_then(|p| p.category_id.as_deref());

    if post_category != Some(subcategory.category_id.as_str()) {
        return Err(InstaClientError::Validation(format!(
            "subcategory '{}' belongs to category '{}', post {post_id} is in {}",
            subcategory.id,
            subcategory.category_id,
            post_category.unwrap_or("no category"),
        )));
    }
    Ok(())
}
