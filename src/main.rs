use facedash::{
    camera::Camera,
    cli::{annotate_detections, read_hidden},
    common::{system_config_file, Config, DevMode},
    core::{
        password::hash_password, password_login, DescriptorExtractor, FaceLogin, LoginMethod, LoginOutcome,
        OnnxExtractor, Session, SessionFile,
    },
    storage::{faces, ReferenceImageSource, SheetClient, UserStore},
};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "facedash")]
#[command(about = "Expense dashboard login with face recognition")]
struct Cli {
    /// Enable development mode (saves data locally for testing)
    #[arg(long, global = true)]
    dev: bool,

    /// Config file to use instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in by face
    Login,
    /// Log in with email and password
    LoginPassword {
        #[arg(short, long)]
        email: String,
        /// Prompted for without echo when omitted
        #[arg(short, long)]
        password: Option<String>,
    },
    /// Forget the current session
    Logout,
    /// Show the logged-in user
    Whoami,
    /// Check every enrolled user's reference photo yields a descriptor
    CheckReferences,
    /// Test camera
    TestCamera,
    /// Test face detection
    TestDetection {
        /// Use this image instead of a camera frame
        #[arg(short, long)]
        image: Option<PathBuf>,
    },
    /// Detect IR camera automatically
    DetectCamera,
    /// Print a bcrypt hash for the users sheet
    HashPassword {
        password: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.dev);
    dotenv::dotenv().ok();

    let dev_mode = DevMode::new(cli.dev)?;
    let session_file = SessionFile::new(dev_mode.session_file());

    match cli.command {
        Commands::Login => {
            let config = load_config(&cli.config, &dev_mode)?;
            let extractor = OnnxExtractor::new(&config, &dev_mode.models_dir())
                .context("Failed to load face models")?;
            let store = SheetClient::new(&config.sheet)?;
            let images = faces::from_config(&config.faces, http_client(&config)?);
            let mut camera = Camera::new(&config);

            println!("Look at the camera...");
            let mut login = FaceLogin::new(&extractor, &*images, &store, config.auth.clone());
            let cancel = async {
                let _ = tokio::signal::ctrl_c().await;
            };

            match login.attempt_until(&mut camera, cancel).await {
                LoginOutcome::Accepted(session) => {
                    session_file.save(&session)?;
                    print_session(&session);
                }
                LoginOutcome::Rejected(reason) => bail!("{}", reason),
            }
        }
        Commands::LoginPassword { email, password } => {
            let config = load_config(&cli.config, &dev_mode)?;
            let store = SheetClient::new(&config.sheet)?;

            let password = match password {
                Some(password) => password,
                None => prompt_password()?,
            };

            let session = password_login(&store, &email, &password).await?;
            session_file.save(&session)?;
            print_session(&session);
        }
        Commands::Logout => {
            if session_file.clear()? {
                println!("Logged out");
            } else {
                println!("No active session");
            }
        }
        Commands::Whoami => match session_file.load()? {
            Some(session) => print_session(&session),
            None => println!("Not logged in"),
        },
        Commands::CheckReferences => {
            let config = load_config(&cli.config, &dev_mode)?;
            let extractor = OnnxExtractor::new(&config, &dev_mode.models_dir())
                .context("Failed to load face models")?;
            let store = SheetClient::new(&config.sheet)?;
            let images = faces::from_config(&config.faces, http_client(&config)?);

            check_references(&extractor, &*images, &store).await?;
        }
        Commands::TestCamera => {
            println!("Testing camera...");
            let config = load_config(&cli.config, &dev_mode)?;
            let mut camera = Camera::new(&config);

            let frame = camera.capture_frame()?;
            println!("✓ Captured {}x{} frame", frame.width(), frame.height());

            let path = dev_mode.get_capture_path("test_capture");
            frame.save(&path)?;
            println!("✓ Saved to {}", path.display());
        }
        Commands::TestDetection { image } => {
            println!("Testing face detection...");
            let config = load_config(&cli.config, &dev_mode)?;
            let extractor = OnnxExtractor::new(&config, &dev_mode.models_dir())
                .context("Failed to load face models")?;

            let frame = match image {
                Some(path) => image::open(&path).with_context(|| format!("Failed to open {}", path.display()))?,
                None => Camera::new(&config).capture_frame()?,
            };

            let (all_faces, accepted) = extractor.detector().detect_all(&frame)?;
            println!("Raw detections: {}", all_faces.len());
            println!("After filtering: {}", accepted.len());
            for (i, face) in accepted.iter().enumerate() {
                println!(
                    "  Face {}: ({:.0}, {:.0}) {}x{} confidence {:.3}",
                    i + 1, face.x1, face.y1, face.width() as u32, face.height() as u32, face.confidence
                );
            }

            let annotated = annotate_detections(&frame, &all_faces, &accepted);
            let path = dev_mode.get_debug_path("detection");
            annotated.save(&path)?;
            println!("✓ Annotated image saved to {}", path.display());
        }
        Commands::DetectCamera => {
            println!("🔍 Detecting available cameras...\n");

            let cameras = Camera::list_all_cameras()?;
            if cameras.is_empty() {
                println!("❌ No cameras found!");
                println!("\nTroubleshooting:");
                println!("  1. Check if cameras are connected");
                println!("  2. Ensure you have permission to access /dev/video*");
                return Ok(());
            }

            for camera in &cameras {
                println!("📷 /dev/video{}: {}", camera.index, camera.name);
                for feature in &camera.features {
                    println!("   - {}", feature);
                }
                println!();
            }

            let selected = Camera::detect_ir_camera()?;
            println!("═══════════════════════════════════════════════════════");
            println!("✅ Auto-detect would use /dev/video{}", selected);
            println!("\nThis is used when device_index = 999 in the [camera] section.");
        }
        Commands::HashPassword { password } => {
            println!("{}", hash_password(&password)?);
        }
    }

    Ok(())
}

fn load_config(explicit: &Option<PathBuf>, dev_mode: &DevMode) -> Result<Config> {
    let path = match explicit {
        Some(path) => path.clone(),
        None if dev_mode.is_enabled() => dev_mode.config_file(),
        None => system_config_file(),
    };
    Ok(Config::load_from_path(&path)?)
}

fn http_client(config: &Config) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(config.sheet.timeout_seconds))
        .build()?)
}

fn prompt_password() -> Result<String> {
    match read_hidden("Password: ")? {
        Some(password) => Ok(password),
        None => bail!("Password entry cancelled"),
    }
}

fn print_session(session: &Session) {
    let user = &session.user;
    println!("Logged in as {} ({})", user.email, user.role);
    match &session.method {
        LoginMethod::Face { distance } => println!("Method: face (distance {:.4})", distance),
        LoginMethod::Password => println!("Method: password"),
    }
    println!("Since: {}", session.established_at.to_rfc3339());
}

async fn check_references<X, R, U>(extractor: &X, images: &R, store: &U) -> Result<()>
where
    X: DescriptorExtractor + ?Sized,
    R: ReferenceImageSource + ?Sized,
    U: UserStore + ?Sized,
{
    let users = store.list().await?;
    let mut usable = 0usize;

    for user in &users {
        let Some(face_file) = user.face_image_file.as_deref() else {
            println!("  -  {}: no reference photo", user.email);
            continue;
        };

        let status = match images.load(face_file).await {
            Err(e) => format!("cannot load {}: {}", face_file, e),
            Ok(image) => match extractor.extract(&image) {
                Ok(Some(descriptor)) => {
                    usable += 1;
                    format!("ok ({} dimensions)", descriptor.len())
                }
                Ok(None) => format!("no face found in {}", face_file),
                Err(e) => format!("extraction failed: {}", e),
            },
        };
        let mark = if status.starts_with("ok") { "✓" } else { "✗" };
        println!("  {} {}: {}", mark, user.email, status);
    }

    println!("\n{} of {} users can log in by face", usable, users.len());
    Ok(())
}

fn setup_logging(dev_mode: bool) {
    if dev_mode {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_file(true)
            .with_line_number(true)
            .with_thread_ids(true)
            .init();
    } else {
        tracing_subscriber::fmt::init();
    }
}
