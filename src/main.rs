use anyhow::{anyhow, bail, Context, Result};
use carousel_studio_lib::config;
use carousel_studio_lib::db::models::Identity;
use carousel_studio_lib::llm::TextField;
use carousel_studio_lib::models::{AspectRatio, BrandKit, PreferencesPatch};
use carousel_studio_lib::router::View;
use carousel_studio_lib::App;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "carousel-studio")]
#[command(about = "Generate, edit and export social media carousels", long_about = None)]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in with an identity; first sign-in creates the profile
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        name: Option<String>,
    },
    /// Sign out and forget the cached profile
    Logout,
    /// Finish profile setup
    Profile {
        #[arg(long)]
        name: String,
        /// Content niche, repeatable
        #[arg(long = "niche", required = true)]
        niches: Vec<String>,
    },
    /// Generate a new carousel for a topic
    Generate {
        topic: String,
        #[arg(long)]
        niche: Option<String>,
        #[arg(long)]
        slides: Option<u8>,
        #[arg(long, value_enum)]
        ratio: Option<Ratio>,
        /// Skip image generation
        #[arg(long)]
        no_images: bool,
    },
    /// List saved carousels, newest first
    History,
    /// Print a saved carousel as JSON
    Show { id: String },
    /// Delete a saved carousel
    Delete { id: String },
    /// Rewrite one slide's headline or body
    Rewrite {
        id: String,
        #[arg(long)]
        slide: usize,
        #[arg(long, value_enum)]
        field: Field,
    },
    /// Regenerate one slide's image
    Image {
        id: String,
        #[arg(long)]
        slide: usize,
        /// Edit the existing image instead of regenerating it
        #[arg(long)]
        edit: Option<String>,
    },
    /// Generate a short video for one slide
    Video {
        id: String,
        #[arg(long)]
        slide: usize,
    },
    /// Generate a post caption for a carousel
    Caption { id: String },
    /// Export a carousel as a zip archive of slide images
    Export { id: String },
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
}

#[derive(Subcommand)]
enum SettingsAction {
    /// Store the generation API key
    SetKey { key: String },
    /// Save the brand kit
    Brand {
        #[arg(long)]
        name: String,
        #[arg(long)]
        primary: Option<String>,
        #[arg(long)]
        secondary: Option<String>,
        #[arg(long)]
        text: Option<String>,
        #[arg(long)]
        handle: Option<String>,
    },
    /// Switch the interface language
    Locale { locale: String },
    Show,
}

#[derive(Clone, Copy, ValueEnum)]
enum Ratio {
    Square,
    Portrait,
    Story,
}

impl From<Ratio> for AspectRatio {
    fn from(ratio: Ratio) -> Self {
        match ratio {
            Ratio::Square => AspectRatio::Square,
            Ratio::Portrait => AspectRatio::Portrait,
            Ratio::Story => AspectRatio::Story,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Field {
    Headline,
    Body,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("carousel_studio_lib=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Turns a banner raised by the last operation into an error.
fn check(app: &App) -> Result<()> {
    match app.banner() {
        Some(banner) => Err(anyhow!(banner.message.clone())),
        None => Ok(()),
    }
}

fn require_view(app: &mut App, view: View) -> Result<()> {
    if app.view() == view || app.navigate(view) {
        Ok(())
    } else {
        bail!("Sign in and finish profile setup first")
    }
}

fn open(app: &mut App, id: &str) -> Result<()> {
    require_view(app, View::Generator)?;
    if !app.open_from_history(id) {
        bail!("No saved carousel with id {id}");
    }
    Ok(())
}

fn slide_id(app: &App, position: usize) -> Result<String> {
    app.current()
        .and_then(|c| position.checked_sub(1).and_then(|i| c.slides.get(i)))
        .map(|s| s.id.clone())
        .ok_or_else(|| anyhow!("No slide {position}"))
}

/// Leaves the editor so the open carousel is written back to history.
fn close(app: &mut App) -> Result<()> {
    app.navigate(View::Dashboard);
    check(app)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => config::load_from_path(path),
        None => config::load(),
    }
    .context("Failed to load config")?;
    let mut app = App::open(config).context("Failed to open database")?;
    app.set_status_sink(|line| eprintln!("{line}"));

    match cli.command {
        Commands::Login { email, name } => {
            let identity = Identity {
                id: email.trim().to_lowercase(),
                email,
                name,
                picture: None,
            };
            app.sign_in(identity).await;
            check(&app)?;
            println!("Signed in ({:?})", app.view());
        }
        Commands::Logout => app.sign_out(),
        Commands::Profile { name, niches } => {
            app.complete_profile(&name, niches).await;
            check(&app)?;
        }
        Commands::Generate {
            topic,
            niche,
            slides,
            ratio,
            no_images,
        } => {
            require_view(&mut app, View::Generator)?;
            app.patch_preferences(PreferencesPatch {
                slide_count: slides,
                aspect_ratio: ratio.map(AspectRatio::from),
                generate_images: no_images.then_some(false),
                ..Default::default()
            });
            let id = app.generate(&topic, niche.as_deref()).await;
            check(&app)?;
            close(&mut app)?;
            if let Some(id) = id {
                println!("{id}");
            }
        }
        Commands::History => {
            if app.history().is_empty() {
                println!("{}", app.i18n().tr("history-empty"));
            }
            for carousel in app.history() {
                println!(
                    "{}  {}  {:<12} {} slides  {}",
                    carousel.id,
                    carousel.created_at.format("%Y-%m-%d %H:%M"),
                    carousel.category,
                    carousel.slides.len(),
                    carousel.title
                );
            }
        }
        Commands::Show { id } => {
            open(&mut app, &id)?;
            let json = serde_json::to_string_pretty(&app.current())?;
            println!("{json}");
        }
        Commands::Delete { id } => {
            app.delete_from_history(&id);
            check(&app)?;
        }
        Commands::Rewrite { id, slide, field } => {
            open(&mut app, &id)?;
            let slide_id = slide_id(&app, slide)?;
            let field = match field {
                Field::Headline => TextField::Headline,
                Field::Body => TextField::Body,
            };
            app.regenerate_field(&slide_id, field).await;
            check(&app)?;
            close(&mut app)?;
        }
        Commands::Image { id, slide, edit } => {
            open(&mut app, &id)?;
            let slide_id = slide_id(&app, slide)?;
            match edit {
                Some(instruction) => app.edit_image(&slide_id, &instruction).await,
                None => app.regenerate_image(&slide_id).await,
            };
            check(&app)?;
            close(&mut app)?;
        }
        Commands::Video { id, slide } => {
            open(&mut app, &id)?;
            let slide_id = slide_id(&app, slide)?;
            app.generate_video(&slide_id).await;
            check(&app)?;
            close(&mut app)?;
        }
        Commands::Caption { id } => {
            open(&mut app, &id)?;
            let caption = app.generate_caption().await;
            check(&app)?;
            close(&mut app)?;
            if let Some(caption) = caption {
                println!("{caption}");
            }
        }
        Commands::Export { id } => {
            open(&mut app, &id)?;
            let outcome = app.export(None).await;
            check(&app)?;
            if let Some(outcome) = outcome {
                println!("{}", outcome.path.display());
            }
        }
        Commands::Settings { action } => match action {
            SettingsAction::SetKey { key } => app.set_api_key(&key),
            SettingsAction::Brand {
                name,
                primary,
                secondary,
                text,
                handle,
            } => {
                let mut kit: BrandKit = app.settings().brand_kit.clone();
                kit.name = name;
                if let Some(color) = primary {
                    kit.primary_color = color;
                }
                if let Some(color) = secondary {
                    kit.secondary_color = color;
                }
                if let Some(color) = text {
                    kit.text_color = color;
                }
                if handle.is_some() {
                    kit.branding_text = handle;
                }
                app.set_brand_kit(kit);
            }
            SettingsAction::Locale { locale } => app.set_locale(&locale),
            SettingsAction::Show => {
                let settings = app.settings();
                println!("api key:  {}", settings.masked_api_key());
                println!("brand:    {}", settings.brand_kit.name);
                println!("locale:   {}", settings.locale);
                println!("exports:  {}", app.download_count());
                if let Some(profile) = app.profile() {
                    println!("user:     {} ({})", profile.name, profile.email);
                }
            }
        },
    }
    check(&app)
}
