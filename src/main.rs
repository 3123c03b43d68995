use fern::colors::{Color, ColoredLevelConfig};
use warp::Filter;

mod config;
mod routes;

use config::ServerConfig;
use db::{new_db, seed_administrator, Database, JSONDatabase};

#[tokio::main]
async fn main() {
    let (config, warnings) = ServerConfig::from_env();

    if let Err(err) = setup_logging(config.log_level) {
        eprintln!("Could not apply logging configuration: {}", err);
        std::process::exit(1);
    }

    for warning in warnings {
        log::warn!("{}", warning);
    }

    let mut database = match JSONDatabase::open(config.database_path.clone()) {
        Ok(database) => database,
        Err(err) => {
            log::error!(
                "Could not open database {}: {}",
                config.database_path.display(),
                err
            );
            std::process::exit(1);
        }
    };

    if database.user_get_by_email(&config.admin_email).is_none() {
        let seeded = bcrypt::hash(&config.admin_password, config.bcrypt_cost)
            .map_err(|e| e.to_string())
            .and_then(|hash| {
                seed_administrator(&mut database, &config.admin_email, &config.admin_name, hash)
                    .map_err(|e| e.to_string())
            });

        if let Err(err) = seeded {
            log::error!("Could not create administrator account: {}", err);
            std::process::exit(1);
        }
    }

    let global_db = new_db(database);

    let cors = warp::cors()
        .allow_any_origin()
        .allow_methods(vec!["GET", "POST", "PUT", "DELETE"])
        .allow_headers(vec!["content-type", "Authorization"]);

    let filters = routes::api(&global_db, &config)
        .with(cors)
        // After recovery for correct status codes
        .with(warp::log("coursehub"));

    log::info!("Listening on http://{}", config.http_addr);
    warp::serve(filters).run(config.http_addr).await;
}

fn setup_logging(level: log::LevelFilter) -> Result<(), log::SetLoggerError> {
    let colors = ColoredLevelConfig::new().debug(Color::Magenta);

    fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "{}{} {}",
                colors.color(record.level()),
                chrono::Local::now().format("[%H:%M:%S]"),
                message
            ))
        })
        .level(level)
        .chain(std::io::stdout())
        .apply()
}
