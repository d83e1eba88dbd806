use std::process;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use insta_client::{
    InstaClient, InstaClientError, MediaType, Metric, SortDirection, SortField,
};
use insta_dashboard::sync::DEFAULT_EVENT_CAPACITY;
use insta_dashboard::views::{average_metric, compare_periods, ensure_min_posts, top_content};
use insta_dashboard::{
    AppState, DerivedViews, FilterSelection, FilterState, JobOutcome, JobPoller, PollConfig,
    PostCollectionStore, SubcategoryPolicy, SyncCoordinator, TableController,
};

mod logging;
mod output;
mod settings;

use logging::init_logging;
use output::{MetricAverage, StatsReport, print_categories, print_json, print_posts, print_subcategories};
use settings::{Settings, normalize_api_url};

#[derive(Debug, Parser)]
#[command(name = "insta-cli", version, about = "CLI для дашборда аналитики Instagram")]
struct Cli {
    /// Адрес backend API (по умолчанию INSTA_API_URL).
    #[arg(long, global = true)]
    server: Option<String>,

    /// Аккаунт Instagram (по умолчанию INSTA_USERNAME или текущая сессия).
    #[arg(long, global = true)]
    username: Option<String>,

    /// Печатать результат в JSON.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Состояние сессии.
    Status,
    /// Адрес для входа через Facebook (открыть в браузере).
    LoginUrl,
    /// Завершение сессии.
    Logout,
    /// Страница таблицы постов с фильтром.
    Posts(PostsArgs),
    /// Обновление метрик и перезагрузка таблицы.
    Sync {
        /// Ждать, пока сервер отдаст обновлённые метрики.
        #[arg(long)]
        wait: bool,
        /// Пауза между проверками, секунды.
        #[arg(long, default_value_t = 2)]
        interval_secs: u64,
        /// Максимум проверок.
        #[arg(long, default_value_t = 60)]
        max_attempts: u32,
    },
    /// Назначение категории посту; без `--category` категория снимается.
    AssignCategory {
        #[arg(long)]
        post: String,
        #[arg(long)]
        category: Option<String>,
    },
    /// Назначение подкатегории посту; без `--subcategory` подкатегория снимается.
    AssignSubcategory {
        #[arg(long)]
        post: String,
        #[arg(long)]
        subcategory: Option<String>,
    },
    /// Категории аккаунта.
    Categories {
        #[command(subcommand)]
        command: CategoriesCommand,
    },
    /// Подкатегории аккаунта.
    Subcategories {
        #[command(subcommand)]
        command: SubcategoriesCommand,
    },
    /// Сводная статистика за последние дни.
    Stats(StatsArgs),
}

#[derive(Debug, Subcommand)]
enum CategoriesCommand {
    /// Список категорий.
    List,
    /// Создание категории.
    Create {
        #[arg(long)]
        name: String,
    },
}

#[derive(Debug, Subcommand)]
enum SubcategoriesCommand {
    /// Список подкатегорий (всех или одной категории).
    List {
        #[arg(long)]
        category: Option<String>,
    },
    /// Создание подкатегории в категории.
    Create {
        #[arg(long)]
        category: String,
        #[arg(long)]
        name: String,
    },
}

#[derive(Debug, Args)]
struct PostsArgs {
    /// Типы публикаций через запятую: IMAGE, VIDEO, CAROUSEL_ALBUM, REEL.
    #[arg(long = "type", value_delimiter = ',')]
    types: Vec<MediaType>,
    /// Идентификаторы категорий через запятую.
    #[arg(long = "category", value_delimiter = ',')]
    categories: Vec<String>,
    /// Идентификаторы подкатегорий через запятую (только вместе с категориями).
    #[arg(long = "subcategory", value_delimiter = ',')]
    subcategories: Vec<String>,
    /// Окно в днях; 0 означает всё время.
    #[arg(long, default_value_t = 0)]
    days: u32,
    #[arg(long, default_value_t = 1)]
    page: u32,
    /// Поле сортировки, например `views` или `published_at`.
    #[arg(long)]
    sort: Option<SortField>,
    #[arg(long, default_value = "desc")]
    direction: SortDirection,
}

#[derive(Debug, Args)]
struct StatsArgs {
    /// Окно в днях.
    #[arg(long, default_value_t = 30, value_parser = clap::value_parser!(u32).range(1..))]
    days: u32,
    /// Метрика для графика и сравнения периодов.
    #[arg(long, default_value = "views")]
    metric: Metric,
    /// Размер топа по просмотрам.
    #[arg(long, default_value_t = 5)]
    top: usize,
    /// Минимум постов в окне.
    #[arg(long, default_value_t = 1)]
    min_posts: usize,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("Ошибка: {err:#}");
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut settings = Settings::from_env().context("некорректная конфигурация окружения")?;
    init_logging(&settings.log_level)?;

    if let Some(server) = cli.server {
        settings.api_url = normalize_api_url(server);
    }
    if let Some(username) = cli.username.filter(|u| !u.trim().is_empty()) {
        settings.username = Some(username.trim().to_string());
    }

    let client = Arc::new(
        InstaClient::with_options(settings.client_options()).map_err(map_client_error)?,
    );
    tracing::debug!(api_url = %settings.api_url, "client configured");

    match cli.command {
        Command::Status => {
            let status = client.auth_status().await.map_err(map_client_error)?;
            if cli.json {
                print_json(&status)?;
            } else if status.authenticated {
                println!(
                    "Сессия активна: {}",
                    status.username.as_deref().unwrap_or("<аккаунт не указан>")
                );
            } else {
                println!("Сессии нет. Войдите: insta-cli login-url");
            }
        }
        Command::LoginUrl => {
            println!("{}", client.login_url().map_err(map_client_error)?);
        }
        Command::Logout => {
            client.logout().await.map_err(map_client_error)?;
            println!("Сессия завершена");
        }
        Command::Posts(args) => {
            let app = open_session(&client, &settings).await?;
            show_posts(client, app, build_filter(&args), cli.json).await?;
        }
        Command::Sync {
            wait,
            interval_secs,
            max_attempts,
        } => {
            let app = open_session(&client, &settings).await?;
            let poll = wait.then(|| PollConfig {
                interval: Duration::from_secs(interval_secs.max(1)),
                max_attempts,
            });
            sync_metrics(client, app, poll).await?;
        }
        Command::AssignCategory { post, category } => {
            let app = open_session(&client, &settings).await?;
            let controller = TableController::new(Arc::new(PostCollectionStore::new(client)), app);
            controller
                .assign_category(&post, category.as_deref())
                .await
                .map_err(map_client_error)?
                .into_result()
                .map_err(map_client_error)?;
            match category {
                Some(category) => println!("Категория {category} назначена посту {post}"),
                None => println!("Категория снята с поста {post}"),
            }
        }
        Command::AssignSubcategory { post, subcategory } => {
            let app = open_session(&client, &settings).await?;
            let policy = settings.subcategory_policy();
            let controller = TableController::new(Arc::new(PostCollectionStore::new(client)), app.clone())
                .with_policy(policy);
            if policy == SubcategoryPolicy::RequireMatchingParent {
                // проверке родителя нужны посты и справочник подкатегорий
                controller
                    .store()
                    .load_dashboard(app.username().as_deref())
                    .await
                    .map_err(map_client_error)?;
            }
            controller
                .assign_subcategory(&post, subcategory.as_deref())
                .await
                .map_err(map_client_error)?
                .into_result()
                .map_err(map_client_error)?;
            match subcategory {
                Some(subcategory) => println!("Подкатегория {subcategory} назначена посту {post}"),
                None => println!("Подкатегория снята с поста {post}"),
            }
        }
        Command::Categories { command } => {
            let username = resolve_username(&client, &settings).await?;
            match command {
                CategoriesCommand::List => {
                    let categories = client
                        .list_categories(&username)
                        .await
                        .map_err(map_client_error)?;
                    if cli.json {
                        print_json(&categories)?;
                    } else {
                        print_categories(&categories);
                    }
                }
                CategoriesCommand::Create { name } => {
                    let category = client
                        .create_category(&username, &name)
                        .await
                        .map_err(map_client_error)?;
                    if cli.json {
                        print_json(&category)?;
                    } else {
                        println!("Категория создана: [{}] {}", category.id, category.name);
                    }
                }
            }
        }
        Command::Subcategories { command } => {
            let username = resolve_username(&client, &settings).await?;
            match command {
                SubcategoriesCommand::List { category } => {
                    let subcategories = client
                        .list_subcategories(&username, category.as_deref())
                        .await
                        .map_err(map_client_error)?;
                    if cli.json {
                        print_json(&subcategories)?;
                    } else {
                        print_subcategories(&subcategories);
                    }
                }
                SubcategoriesCommand::Create { category, name } => {
                    let subcategory = client
                        .create_subcategory(&username, &category, &name)
                        .await
                        .map_err(map_client_error)?;
                    if cli.json {
                        print_json(&subcategory)?;
                    } else {
                        println!(
                            "Подкатегория создана: [{}] {} (категория {})",
                            subcategory.id, subcategory.name, subcategory.category_id
                        );
                    }
                }
            }
        }
        Command::Stats(args) => {
            let app = open_session(&client, &settings).await?;
            show_stats(client, app, &args, cli.json).await?;
        }
    }

    Ok(())
}

async fn resolve_username(client: &InstaClient, settings: &Settings) -> Result<String> {
    if let Some(username) = &settings.username {
        return Ok(username.clone());
    }

    let status = client.auth_status().await.map_err(map_client_error)?;
    match status.username {
        Some(username) if status.authenticated => Ok(username),
        _ => Err(map_client_error(InstaClientError::AuthRequired)),
    }
}

async fn open_session(client: &InstaClient, settings: &Settings) -> Result<AppState> {
    let username = resolve_username(client, settings).await?;
    let app = AppState::new();
    app.set_username(Some(username));
    Ok(app)
}

fn build_filter(args: &PostsArgs) -> FilterState {
    let mut filter = FilterState::new();
    filter.set_media_types(args.types.iter().copied());
    filter.set_categories(args.categories.iter().cloned());
    if !args.subcategories.is_empty() && args.categories.is_empty() {
        tracing::warn!("subcategory filter ignored: no category selected");
    }
    filter.set_subcategories(args.subcategories.iter().cloned());
    filter.set_days(args.days);
    if let Some(field) = args.sort {
        filter.set_sort(field, args.direction, None);
    }
    filter.set_page(args.page);
    filter
}

async fn show_posts(
    client: Arc<InstaClient>,
    app: AppState,
    filter: FilterState,
    json: bool,
) -> Result<()> {
    let store = Arc::new(PostCollectionStore::new(client));
    let controller = TableController::with_filter(store.clone(), app.clone(), filter);
    let outcome = controller.reload().await.map_err(map_client_error)?;
    tracing::debug!(?outcome, "posts table loaded");

    let state = store.snapshot();
    if json {
        print_json(&serde_json::json!({
            "posts": state.posts,
            "pagination": state.pagination,
            "last_update": app.last_update(),
        }))?;
    } else {
        print_posts(&state, app.last_update());
    }
    Ok(())
}

async fn sync_metrics(client: Arc<InstaClient>, app: AppState, poll: Option<PollConfig>) -> Result<()> {
    let store = PostCollectionStore::new(client.clone());
    let coordinator = SyncCoordinator::new(client, app.clone(), DEFAULT_EVENT_CAPACITY);

    if poll.is_some() {
        store
            .load_dashboard(app.username().as_deref())
            .await
            .map_err(map_client_error)?;
        store.read(|state| app.record_metrics_update(&state.posts));
    }
    let baseline = app.last_update();

    coordinator
        .sync_and_reload(&store, &FilterSelection::default())
        .await
        .map_err(map_client_error)?;
    println!("Синхронизация запущена, постов на первой странице: {}", store.read(|s| s.posts.len()));

    let Some(config) = poll else {
        return Ok(());
    };
    if app.last_update() > baseline {
        println!("Метрики обновлены: {}", format_update(app.last_update()));
        return Ok(());
    }

    let (mut poller, cancel) = JobPoller::new(config);
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });
    let outcome = coordinator.wait_for_fresh_metrics(&mut poller, baseline).await;
    interrupt.abort();

    match outcome.map_err(map_client_error)? {
        JobOutcome::Complete(at) => println!("Метрики обновлены: {}", at.to_rfc3339()),
        JobOutcome::Cancelled => println!("Ожидание прервано"),
        JobOutcome::Failed(message) => bail!("обновление метрик завершилось ошибкой: {message}"),
        JobOutcome::TimedOut { attempts } => {
            bail!("метрики не обновились после {attempts} проверок")
        }
    }
    Ok(())
}

async fn show_stats(client: Arc<InstaClient>, app: AppState, args: &StatsArgs, json: bool) -> Result<()> {
    let store = PostCollectionStore::new(client);
    store
        .load_dashboard(app.username().as_deref())
        .await
        .map_err(map_client_error)?;
    let state = store.snapshot();
    app.record_metrics_update(&state.posts);

    let mut filter = FilterState::new();
    filter.set_days(args.days);
    let now = Utc::now();
    let mut views = DerivedViews::new();

    let posts = views.filtered(&state, filter.selection(), now).to_vec();
    ensure_min_posts(posts.len(), args.min_posts).map_err(map_client_error)?;

    let report = StatsReport {
        days: args.days,
        posts: posts.len(),
        last_update: app.last_update(),
        averages: Metric::ALL
            .iter()
            .map(|&metric| MetricAverage {
                metric,
                value: average_metric(&posts, metric),
            })
            .collect(),
        top: top_content(&posts, args.top).into_iter().cloned().collect(),
        distribution: views.distribution(&state, filter.selection(), now).clone(),
        metric: args.metric,
        chart: views
            .chart(&state, filter.selection(), args.metric, now)
            .to_vec(),
        comparison: compare_periods(&state.posts, args.metric, args.days, now),
    };

    if json {
        print_json(&report)
    } else {
        report.print();
        Ok(())
    }
}

fn format_update(at: Option<chrono::DateTime<Utc>>) -> String {
    at.map_or_else(|| "нет данных".to_string(), |at| at.to_rfc3339())
}

fn map_client_error(err: InstaClientError) -> anyhow::Error {
    let message = match err {
        InstaClientError::AuthRequired => {
            "требуется авторизация: откройте адрес из `insta-cli login-url`, затем передайте cookie \
             сессии через INSTA_SESSION_COOKIE или укажите --username"
                .to_string()
        }
        InstaClientError::Fetch { status, message } => {
            format!("сервер отклонил запрос (HTTP {status}): {message}")
        }
        InstaClientError::Validation(message) => format!("некорректный запрос: {message}"),
        InstaClientError::InvalidConfig(message) => format!("некорректная конфигурация: {message}"),
        InstaClientError::Http(err) => format!("ошибка HTTP: {err}"),
    };
    anyhow!(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).expect("valid command line")
    }

    #[test]
    fn posts_args_build_filter_with_requested_page() {
        let cli = parse(&[
            "insta-cli", "posts", "--type", "REEL,IMAGE", "--category", "c1", "--subcategory", "s1",
            "--days", "7", "--sort", "views", "--direction", "asc", "--page", "3",
        ]);
        let Command::Posts(args) = cli.command else {
            panic!("expected posts command");
        };

        let filter = build_filter(&args);
        let query = filter.selection().to_query();
        assert_eq!(query.page, 3);
        assert_eq!(query.days, 7);
        assert_eq!(query.sort_field, SortField::Views);
        assert_eq!(query.sort_direction, SortDirection::Asc);
        assert!(query.media_types.contains(&MediaType::Video));
        assert!(query.media_types.contains(&MediaType::Image));
        assert_eq!(query.subcategories, vec!["s1".to_string()]);
    }

    #[test]
    fn subcategories_without_categories_are_dropped() {
        let cli = parse(&["insta-cli", "posts", "--subcategory", "s1"]);
        let Command::Posts(args) = cli.command else {
            panic!("expected posts command");
        };
        assert!(build_filter(&args).selection().subcategories().is_empty());
    }

    #[test]
    fn stats_rejects_zero_days() {
        assert!(Cli::try_parse_from(["insta-cli", "stats", "--days", "0"]).is_err());
        let cli = parse(&["insta-cli", "stats", "--metric", "likes"]);
        let Command::Stats(args) = cli.command else {
            panic!("expected stats command");
        };
        assert_eq!(args.metric, Metric::Likes);
        assert_eq!(args.days, 30);
    }

    #[test]
    fn global_flags_work_after_subcommand() {
        let cli = parse(&["insta-cli", "categories", "list", "--username", "acme", "--json"]);
        assert_eq!(cli.username.as_deref(), Some("acme"));
        assert!(cli.json);
    }

    #[test]
    fn auth_error_explains_how_to_log_in() {
        let message = map_client_error(InstaClientError::AuthRequired).to_string();
        assert!(message.contains("login-url"));
    }

    #[test]
    fn fetch_error_keeps_status_and_message() {
        let message = map_client_error(InstaClientError::Fetch {
            status: 404,
            message: "post not found".to_string(),
        })
        .to_string();
        assert!(message.contains("404"));
        assert!(message.contains("post not found"));
    }
}
