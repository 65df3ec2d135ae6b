use std::io;
use std::path::Path;

use actix_web::middleware::{self, Logger};
use actix_web::web::Data;
use actix_web::{get, App, HttpResponse, HttpServer, Responder};
use clap::Parser;
use covid_refresh::api::owid;
use covid_refresh::db::prod_db::ProdDb;
use covid_refresh::utils::lib_postgres::DbConfig;
use env_logger::Env;
use log::info;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Port number
    #[arg(short, long, default_value = "8111")]
    port: u16,

    /// Address to bind to, use 0.0.0.0 to allow all connections
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Environment name, e.g., test, prod.  Loads the file `.env/<env>.env`
    #[arg(short, long)]
    env: Option<String>,
}

#[get("/")]
async fn hello() -> impl Responder {
    HttpResponse::Ok().body("Hello world!  This is the covid refresh server.")
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    let args = Args::parse();

    env_logger::init_from_env(Env::default().default_filter_or("info"));

    if let Some(env) = &args.env {
        dotenvy::from_path(Path::new(format!(".env/{}.env", env).as_str()))
            .map_err(io::Error::other)?;
    }
    let db_config = DbConfig::from_env().map_err(io::Error::other)?;
    info!("using database {:?}", db_config);
    let archive = ProdDb::owid_covid();

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(middleware::Compress::default())
            .app_data(Data::new(archive.clone()))
            .app_data(Data::new(db_config.clone()))
            .service(hello)
            .service(owid::refresh::api_refresh)
    })
    .bind((args.host.as_str(), args.port))?
    .run()
    .await
}
