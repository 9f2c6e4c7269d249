//! memories CLI: manage the local collection and sync it with a remote.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use memories_sync::cache::ImageCache;
use memories_sync::config::Config;
use memories_sync::engine::{RemoteOutcome, SyncCoordinator};
use memories_sync::model::{self, Category, MemoryDraft, MemoryId, MemoryRecord};
use memories_sync::remote::RemotePort;
use memories_sync::remote::dir::DirRemote;
use memories_sync::remote::memory::MemoryRemote;
use memories_sync::storage::LocalStore;
use memories_sync::telemetry::{TelemetryConfig, init_telemetry};

#[derive(Parser)]
#[command(name = "memories", about = "Travel memories, kept locally and synced")]
struct Cli {
    /// TOML config file. Without it, settings come from the environment.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List records, merged with the remote when one is configured
    List {
        /// Only featured records
        #[arg(long)]
        featured: bool,
        /// Favorites first instead of by name
        #[arg(long, conflicts_with = "featured")]
        favorites_first: bool,
        /// Group by category
        #[arg(long, conflicts_with_all = ["featured", "favorites_first"])]
        by_category: bool,
    },
    /// Add a record
    Add {
        name: String,
        #[arg(long, default_value = "Travel")]
        category: String,
        #[arg(long, default_value = "")]
        country: String,
        #[arg(long, default_value = "")]
        state: String,
        #[arg(long, default_value = "")]
        description: String,
        /// Visit date, free-form
        #[arg(long)]
        visited: Option<String>,
        #[arg(long, allow_negative_numbers = true, requires = "lon")]
        lat: Option<f64>,
        #[arg(long, allow_negative_numbers = true, requires = "lat")]
        lon: Option<f64>,
        #[arg(long)]
        favorite: bool,
        #[arg(long)]
        featured: bool,
        /// Image files in gallery order. The first is the profile image.
        #[arg(long = "image")]
        images: Vec<PathBuf>,
    },
    /// Delete a record
    Delete { id: MemoryId },
    /// Gallery operations
    Gallery {
        #[command(subcommand)]
        action: GalleryAction,
    },
    /// Profile operations
    Profile {
        #[command(subcommand)]
        action: ProfileAction,
    },
}

#[derive(Subcommand)]
enum GalleryAction {
    /// Fetch a record's images, optionally writing them to a directory
    Show {
        id: MemoryId,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Append images to the end of a gallery
    Append {
        id: MemoryId,
        #[arg(required = true)]
        images: Vec<PathBuf>,
    },
    /// Remove the image at an index (not the profile image)
    Remove { id: MemoryId, index: usize },
    /// Replace the profile image
    Profile { id: MemoryId, image: PathBuf },
}

#[derive(Subcommand)]
enum ProfileAction {
    Show,
    Set {
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        notifications: Option<bool>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };

    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "memories".to_string(),
        log_level: config.log_level.clone(),
    })?;

    let coordinator = open_coordinator(&config)?;

    match cli.command {
        Command::List {
            featured,
            favorites_first,
            by_category,
        } => cmd_list(&coordinator, featured, favorites_first, by_category).await,
        Command::Add {
            name,
            category,
            country,
            state,
            description,
            visited,
            lat,
            lon,
            favorite,
            featured,
            images,
        } => {
            let mut draft = MemoryDraft::new(name, Category::from(category))
                .country(country)
                .state(state)
                .description(description)
                .favorite(favorite)
                .featured(featured);
            if let Some(date) = visited {
                draft = draft.visited(date);
            }
            if let (Some(lat), Some(lon)) = (lat, lon) {
                draft = draft.coordinates(lat, lon);
            }
            cmd_add(&coordinator, draft, &images).await
        }
        Command::Delete { id } => cmd_delete(&coordinator, id).await,
        Command::Gallery { action } => match action {
            GalleryAction::Show { id, out } => cmd_gallery_show(&coordinator, id, out).await,
            GalleryAction::Append { id, images } => {
                cmd_gallery_append(&coordinator, id, &images).await
            }
            GalleryAction::Remove { id, index } => {
                cmd_gallery_remove(&coordinator, id, index).await
            }
            GalleryAction::Profile { id, image } => {
                cmd_gallery_profile(&coordinator, id, &image).await
            }
        },
        Command::Profile { action } => match action {
            ProfileAction::Show => {
                let profile = coordinator.profile().await?;
                println!("Username:       {}", profile.username);
                println!("Notifications:  {}", profile.prefers_notifications);
                Ok(())
            }
            ProfileAction::Set {
                username,
                notifications,
            } => {
                let mut profile = coordinator.profile().await?;
                if let Some(username) = username {
                    profile.username = username;
                }
                if let Some(notifications) = notifications {
                    profile.prefers_notifications = notifications;
                }
                coordinator.save_profile(profile).await?;
                println!("Profile saved.");
                Ok(())
            }
        },
    }
}

fn open_coordinator(config: &Config) -> anyhow::Result<SyncCoordinator> {
    let store = LocalStore::open(&config.data_dir)?.with_seed(config.seed());
    let cache = ImageCache::open(&config.cache_dir)?;
    let remote: Arc<dyn RemotePort> = match &config.remote_dir {
        Some(dir) => Arc::new(DirRemote::open(dir)?),
        None => {
            let offline = MemoryRemote::new();
            offline.set_offline(true);
            Arc::new(offline)
        }
    };
    Ok(SyncCoordinator::open(store, remote, cache)?)
}

/// Merge with the remote, then look the record up.
async fn find(coordinator: &SyncCoordinator, id: MemoryId) -> anyhow::Result<MemoryRecord> {
    if let Err(e) = coordinator.load_all().merged().await {
        eprintln!("warning: remote unavailable, using local records ({e})");
    }
    coordinator
        .get(id)
        .with_context(|| format!("no record with id {id}"))
}

async fn cmd_list(
    coordinator: &SyncCoordinator,
    featured: bool,
    favorites_first: bool,
    by_category: bool,
) -> anyhow::Result<()> {
    let records = match coordinator.load_all().merged().await {
        Ok(records) => records,
        Err(e) => {
            eprintln!("warning: remote unavailable, using local records ({e})");
            coordinator.snapshot()
        }
    };

    if by_category {
        for (category, records) in model::by_category(&records) {
            println!("{category}");
            for record in records {
                print_row(record);
            }
        }
        return Ok(());
    }

    let rows = if featured {
        model::featured(&records)
    } else if favorites_first {
        model::favorites_first(&records)
    } else {
        records.iter().collect()
    };

    if rows.is_empty() {
        println!("No memories found.");
        return Ok(());
    }

    println!(
        "{:<6}  {:<30}  {:<14}  {:<7}  {:<3}  FLAGS",
        "ID", "NAME", "CATEGORY", "ORIGIN", "IMG"
    );
    println!("{}", "-".repeat(80));
    for record in &rows {
        print_row(record);
    }
    println!("\n{} memory(ies)", rows.len());
    Ok(())
}

fn print_row(record: &MemoryRecord) {
    let mut flags = String::new();
    if record.is_favorite {
        flags.push('♥');
    }
    if record.is_featured {
        flags.push('★');
    }
    let name: String = record.name.chars().take(30).collect();
    println!(
        "{:<6}  {:<30}  {:<14}  {:<7}  {:<3}  {}",
        record.id,
        name,
        record.category.as_str(),
        record.origin,
        record.gallery.len(),
        flags
    );
}

async fn cmd_add(
    coordinator: &SyncCoordinator,
    draft: MemoryDraft,
    images: &[PathBuf],
) -> anyhow::Result<()> {
    let bytes = read_images(images).await?;
    let record = coordinator.add(draft, bytes).await?;
    println!(
        "Created: {} {} ({}, {} image(s))",
        record.id,
        record.name,
        record.origin,
        record.gallery.len()
    );
    Ok(())
}

async fn cmd_delete(coordinator: &SyncCoordinator, id: MemoryId) -> anyhow::Result<()> {
    let record = find(coordinator, id).await?;
    match coordinator.delete(&record).await? {
        RemoteOutcome::Synced => println!("Deleted: {id}"),
        RemoteOutcome::LocalOnly => println!("Deleted: {id} (local only)"),
        RemoteOutcome::Failed(e) => println!("Deleted locally: {id}; remote delete failed: {e}"),
    }
    Ok(())
}

async fn cmd_gallery_show(
    coordinator: &SyncCoordinator,
    id: MemoryId,
    out: Option<PathBuf>,
) -> anyhow::Result<()> {
    let record = find(coordinator, id).await?;
    let resolved = coordinator
        .gallery()
        .resolve(&record.gallery, record.profile_backup.as_deref())
        .await?;

    if let Some(dir) = &out {
        tokio::fs::create_dir_all(dir).await?;
    }
    for image in &resolved.images {
        let label = if image.index == 0 { "profile" } else { "" };
        println!(
            "{:>3}  {:<8}  {:>9} bytes  {:?}  {}",
            image.index,
            label,
            image.bytes.len(),
            image.source,
            describe(&image.image)
        );
        if let Some(dir) = &out {
            tokio::fs::write(dir.join(format!("{:03}.jpg", image.index)), &image.bytes).await?;
        }
    }
    for failed in &resolved.failed {
        println!("{:>3}  unavailable: {}", failed.index, failed.error);
    }
    Ok(())
}

async fn cmd_gallery_append(
    coordinator: &SyncCoordinator,
    id: MemoryId,
    images: &[PathBuf],
) -> anyhow::Result<()> {
    let record = find(coordinator, id).await?;
    let bytes = read_images(images).await?;
    let outcome = coordinator.update(record, bytes).await?;
    println!("Gallery now has {} image(s)", outcome.record.gallery.len());
    for failed in &outcome.failed_uploads {
        println!(
            "not uploaded: {} ({})",
            images[failed.batch_index].display(),
            failed.error
        );
    }
    report_remote(&outcome.remote);
    Ok(())
}

async fn cmd_gallery_remove(
    coordinator: &SyncCoordinator,
    id: MemoryId,
    index: usize,
) -> anyhow::Result<()> {
    let mut record = find(coordinator, id).await?;
    record.gallery = coordinator.gallery().remove_at(&record.gallery, index).await?;
    let outcome = coordinator.update(record, Vec::new()).await?;
    println!("Gallery now has {} image(s)", outcome.record.gallery.len());
    report_remote(&outcome.remote);
    Ok(())
}

async fn cmd_gallery_profile(
    coordinator: &SyncCoordinator,
    id: MemoryId,
    image: &Path,
) -> anyhow::Result<()> {
    let mut record = find(coordinator, id).await?;
    let bytes = tokio::fs::read(image)
        .await
        .with_context(|| format!("cannot read {}", image.display()))?;
    let gallery = coordinator.gallery();
    record.gallery = if record.is_synced() {
        gallery.replace_profile(record.id, &record.gallery, bytes).await?
    } else {
        gallery.replace_profile_local(&record.gallery, &bytes).await?
    };
    let outcome = coordinator.update(record, Vec::new()).await?;
    println!("Profile image replaced for {}", outcome.record.name);
    report_remote(&outcome.remote);
    Ok(())
}

fn report_remote(outcome: &RemoteOutcome) {
    if let RemoteOutcome::Failed(e) = outcome {
        println!("warning: saved locally, remote update failed: {e}");
    }
}

fn describe(image: &model::ImageRef) -> String {
    match image {
        model::ImageRef::Remote { url } => url.clone(),
        model::ImageRef::LocalPending { path } => format!("{} (pending)", path.display()),
    }
}

async fn read_images(paths: &[PathBuf]) -> anyhow::Result<Vec<Vec<u8>>> {
    let mut images = Vec::with_capacity(paths.len());
    for path in paths {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("cannot read {}", path.display()))?;
        images.push(bytes);
    }
    Ok(images)
}
