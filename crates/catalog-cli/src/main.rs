use std::io::{self, BufRead, Write};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use catalog_core::format_date;
use catalog_notify::{NotificationMessage, NotificationService};
use catalog_products::ProductUseCases;
use catalog_transport::{ApiClient, HttpClientConfig};
use catalog_ui::form::{FormField, FormMode, ProductFormController, SubmitOutcome};
use catalog_ui::list::{DeleteOutcome, ProductListController, ProductListVm};
use catalog_ui::{Navigator, UnexpectedErrorHandler};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "catalog=info,warn";

#[derive(Debug, Parser)]
#[command(name = "catalog")]
#[command(about = "Product catalog command-line client")]
struct Cli {
    /// Backend base address, e.g. http://localhost:3002/bp
    #[arg(long, env = "CATALOG_API_BASE_URL")]
    base_url: Option<String>,

    #[arg(long, env = "CATALOG_HTTP_TIMEOUT_SECS")]
    timeout_secs: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Search and page through the catalog.
    List {
        #[arg(long, short)]
        query: Option<String>,
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long)]
        page_size: Option<usize>,
    },
    Show {
        id: String,
    },
    Create {
        #[arg(long)]
        id: String,
        #[command(flatten)]
        fields: ProductFields,
    },
    /// Replace an existing product; omitted fields keep their current value.
    Update {
        id: String,
        #[command(flatten)]
        fields: ProductFields,
    },
    Delete {
        id: String,
        /// Skip the confirmation prompt.
        #[arg(long, short)]
        yes: bool,
    },
    /// Check whether an identifier is already taken.
    Verify {
        id: String,
    },
}

#[derive(Debug, Args)]
struct ProductFields {
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    logo: Option<String>,
    /// Release date as YYYY-MM-DD.
    #[arg(long)]
    release: Option<String>,
}

impl ProductFields {
    fn apply(&self, form: &mut ProductFormController) {
        let edits = [
            (FormField::Name, &self.name),
            (FormField::Description, &self.description),
            (FormField::Logo, &self.logo),
            (FormField::DateRelease, &self.release),
        ];
        for (field, value) in edits {
            if let Some(value) = value {
                form.set_value(field, value.clone());
                form.blur(field);
            }
        }
    }
}

/// Prints every route change instead of rendering a screen.
struct TerminalNavigator;

impl Navigator for TerminalNavigator {
    fn navigate(&self, segments: &[String]) {
        println!("-> {}", segments.join("/").replace("//", "/"));
    }
}

struct App {
    use_cases: ProductUseCases,
    notifications: NotificationService,
    navigator: Arc<dyn Navigator>,
}

impl App {
    fn from_cli(cli: &Cli, notifications: NotificationService) -> Result<Self> {
        let mut config = HttpClientConfig::from_env();
        if let Some(base_url) = &cli.base_url {
            config.base_url = base_url.clone();
        }
        if let Some(secs) = cli.timeout_secs {
            config.timeout = Duration::from_secs(secs);
        }
        info!(base_url = %config.base_url, "using catalog backend");

        let http = ApiClient::from_config(&config, notifications.clone())
            .context("failed to build HTTP client")?;
        Ok(Self {
            use_cases: ProductUseCases::over_http(http),
            notifications,
            navigator: Arc::new(TerminalNavigator),
        })
    }

    fn list_controller(&self) -> ProductListController {
        ProductListController::new(&self.use_cases, self.notifications.clone(), self.navigator.clone())
    }

    fn form_controller(&self, mode: FormMode) -> ProductFormController {
        ProductFormController::new(
            mode,
            &self.use_cases,
            self.notifications.clone(),
            self.navigator.clone(),
        )
    }

    async fn run(&self, command: Commands) -> Result<bool> {
        match command {
            Commands::List {
                query,
                page,
                page_size,
            } => {
                let mut list = self.list_controller();
                list.load().await;
                if let Some(query) = query {
                    list.on_search(query);
                }
                if let Some(size) = page_size {
                    if !list.on_page_size_change(size) {
                        eprintln!("page size {size} is not one of 5, 10, 20; keeping {}", list.page_size());
                    }
                }
                list.set_page(page);
                print!("{}", render_table(&list.view()));
                Ok(true)
            }
            Commands::Show { id } => {
                let mut form = self.form_controller(FormMode::Edit(id));
                if form.init().await.is_err() {
                    return Ok(false);
                }
                for field in FormField::ALL {
                    println!("{:<13} {}", field.as_str(), form.value(field));
                }
                Ok(true)
            }
            Commands::Create { id, fields } => {
                let mut form = self.form_controller(FormMode::Create);
                form.set_value(FormField::Id, id);
                form.blur(FormField::Id);
                fields.apply(&mut form);
                let outcome = form.submit().await;
                Ok(report_submit(&form, outcome))
            }
            Commands::Update { id, fields } => {
                let mut form = self.form_controller(FormMode::Edit(id));
                if form.init().await.is_err() {
                    return Ok(false);
                }
                fields.apply(&mut form);
                let outcome = form.submit().await;
                Ok(report_submit(&form, outcome))
            }
            Commands::Delete { id, yes } => {
                let mut list = self.list_controller();
                list.load().await;
                list.on_delete(&id);
                if !yes && !confirm(&format!("Delete \"{}\"?", list.pending_delete_name()))? {
                    list.close_confirm();
                    println!("cancelled");
                    return Ok(true);
                }
                Ok(list.confirm_delete().await == DeleteOutcome::Deleted)
            }
            Commands::Verify { id } => {
                match self.use_cases.verify_identifier.execute(&id).await {
                    Ok(true) => println!("{id}: taken"),
                    Ok(false) => println!("{id}: available"),
                    Err(_) => return Ok(false),
                }
                Ok(true)
            }
        }
    }
}

fn report_submit(form: &ProductFormController, outcome: SubmitOutcome) -> bool {
    match outcome {
        SubmitOutcome::Saved(product) => {
            println!(
                "saved {} (release {}, revision {})",
                product.id,
                format_date(product.date_release),
                format_date(product.date_revision)
            );
            true
        }
        SubmitOutcome::Invalid => {
            for field in FormField::ALL {
                if let Some(message) = form.field_error(field) {
                    eprintln!("  {}: {message}", field.as_str());
                }
            }
            false
        }
        SubmitOutcome::Failed(_) | SubmitOutcome::Cancelled => false,
    }
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{prompt} [y/N] ");
    io::stdout().flush().context("failed to flush stdout")?;
    let mut answer = String::new();
    io::stdin()
        .lock()
        .read_line(&mut answer)
        .context("failed to read confirmation")?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}

fn render_table(vm: &ProductListVm) -> String {
    let mut out = String::new();
    if vm.products.is_empty() {
        out.push_str("no products\n");
    } else {
        out.push_str(&format!(
            "{:<12} {:<24} {:<32} {:<10} {:<10}\n",
            "ID", "NAME", "DESCRIPTION", "RELEASE", "REVISION"
        ));
        for p in &vm.products {
            out.push_str(&format!(
                "{:<12} {:<24} {:<32} {:<10} {:<10}\n",
                p.id,
                truncate(&p.name, 24),
                truncate(&p.description, 32),
                format_date(p.date_release),
                format_date(p.date_revision)
            ));
        }
    }
    out.push_str(&format!(
        "{}-{} of {} | page {}/{} | {} per page\n",
        vm.from, vm.to, vm.total, vm.current_page, vm.total_pages, vm.page_size
    ));
    out
}

fn truncate(value: &str, width: usize) -> String {
    if value.chars().count() <= width {
        return value.to_string();
    }
    let mut cut: String = value.chars().take(width.saturating_sub(3)).collect();
    cut.push_str("...");
    cut
}

fn print_notifications(queue: &[NotificationMessage]) {
    for message in queue.iter().rev() {
        match &message.detail {
            Some(detail) => println!("[{}] {}: {}", message.kind.as_str(), message.title, detail),
            None => println!("[{}] {}", message.kind.as_str(), message.title),
        }
    }
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let notifications = NotificationService::default();
    let outcome = match App::from_cli(&cli, notifications.clone()) {
        Ok(app) => app.run(cli.command).await,
        Err(err) => Err(err),
    };

    let ok = match outcome {
        Ok(ok) => ok,
        Err(err) => {
            UnexpectedErrorHandler::new(notifications.clone()).handle(&format!("{err:#}"));
            false
        }
    };
    print_notifications(&notifications.snapshot());

    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
