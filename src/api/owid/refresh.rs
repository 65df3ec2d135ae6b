use std::error::Error;

use actix_web::{post, web, HttpResponse, Responder};
use log::{error, info};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::db::owid::covid_archive::OwidCovidArchive;
use crate::utils::lib_postgres::DbConfig;

/// Expected body: `{"payload": {"action": "refresh"}}`
#[derive(Debug, Deserialize)]
pub struct Args {
    pub payload: Payload,
}

#[derive(Debug, Deserialize)]
pub struct Payload {
    pub action: Action,
}

#[derive(Debug, PartialEq, Deserialize)]
pub enum Action {
    #[serde(rename = "refresh")]
    Refresh,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ValidationError {
    #[serde(rename = "type")]
    pub kind: String,
    pub loc: Vec<String>,
    pub msg: String,
}

/// Body of a 422 response.  `body` echoes what was sent.
#[derive(Debug, Serialize, Deserialize)]
pub struct Rejection {
    pub detail: Vec<ValidationError>,
    pub body: Value,
}

/// Download the OWID file and update the vaccination and hospitalisation
/// columns of the `country` table.
///
/// Returns 200 with an empty body on success, 422 for a malformed request
/// and 500 with an empty body if anything fails.  Failures are only logged.
#[post("/refresh")]
pub async fn api_refresh(
    body: web::Bytes,
    archive: web::Data<OwidCovidArchive>,
    db: web::Data<DbConfig>,
) -> impl Responder {
    if let Err(rejection) = parse_args(&body) {
        return HttpResponse::UnprocessableEntity().json(rejection);
    }

    match archive.refresh(&db).await {
        Ok(summary) => {
            info!(
                "refresh done: {} countries, {} rows updated",
                summary.countries, summary.rows_updated
            );
            HttpResponse::Ok().finish()
        }
        Err(e) => {
            error!("refresh failed ({} error): {}", e.kind(), e);
            let mut source = e.source();
            while let Some(cause) = source {
                error!("  caused by: {}", cause);
                source = cause.source();
            }
            HttpResponse::InternalServerError().finish()
        }
    }
}

/// Validate the request body before doing any work.
pub fn parse_args(body: &[u8]) -> Result<Args, Rejection> {
    let value: Value = match serde_json::from_slice(body) {
        Ok(v) => v,
        Err(e) => {
            return Err(Rejection {
                detail: vec![ValidationError {
                    kind: "json_invalid".to_string(),
                    loc: vec!["body".to_string(), e.column().to_string()],
                    msg: e.to_string(),
                }],
                body: Value::String(String::from_utf8_lossy(body).into_owned()),
            })
        }
    };
    serde_json::from_value::<Args>(value.clone()).map_err(|e| Rejection {
        detail: vec![ValidationError {
            kind: "value_error".to_string(),
            loc: locate(&value),
            msg: e.to_string(),
        }],
        body: value,
    })
}

/// Path to the first part of the body that doesn't have the expected shape.
fn locate(value: &Value) -> Vec<String> {
    let mut loc = vec!["body".to_string()];
    if !value.is_object() {
        return loc;
    }
    loc.push("payload".to_string());
    if value.get("payload").is_some_and(Value::is_object) {
        loc.push("action".to_string());
    }
    loc
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use actix_web::{http::StatusCode, test as atest, web, App};
    use serde_json::json;

    use crate::db::owid::covid_archive::tests::{
        country_row, seed_country, serve, test_db, LIVE_CSV,
    };

    use super::*;

    fn db_config() -> DbConfig {
        DbConfig {
            host: "127.0.0.1".into(),
            dbname: "covid".into(),
            user: "nobody".into(),
            password: "nothing".into(),
        }
    }

    #[test]
    fn accept_refresh() {
        let args = parse_args(br#"{"payload": {"action": "refresh"}, "extra": 1}"#).unwrap();
        assert_eq!(args.payload.action, Action::Refresh);
    }

    #[test]
    fn reject_other_actions() {
        let rejection = parse_args(br#"{"payload": {"action": "reset"}}"#).unwrap_err();
        assert_eq!(rejection.detail.len(), 1);
        assert_eq!(rejection.detail[0].kind, "value_error");
        assert_eq!(rejection.detail[0].loc, vec!["body", "payload", "action"]);
        assert!(rejection.detail[0].msg.contains("reset"));
        assert_eq!(rejection.body, json!({"payload": {"action": "reset"}}));
    }

    #[test]
    fn reject_wrong_shapes() {
        let rejection = parse_args(br#"{"action": "refresh"}"#).unwrap_err();
        assert_eq!(rejection.detail[0].loc, vec!["body", "payload"]);

        let rejection = parse_args(br#"[1, 2]"#).unwrap_err();
        assert_eq!(rejection.detail[0].loc, vec!["body"]);

        let rejection = parse_args(b"not json").unwrap_err();
        assert_eq!(rejection.detail[0].kind, "json_invalid");
        assert_eq!(rejection.body, json!("not json"));
    }

    #[actix_web::test]
    async fn test_reset_is_rejected() {
        let app = atest::init_service(
            App::new()
                .app_data(web::Data::new(OwidCovidArchive {
                    url: "http://127.0.0.1:9/owid-covid-data.csv".to_string(),
                }))
                .app_data(web::Data::new(db_config()))
                .service(api_refresh),
        )
        .await;
        let req = atest::TestRequest::post()
            .uri("/refresh")
            .set_json(json!({"payload": {"action": "reset"}}))
            .to_request();
        let resp = atest::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let rejection: Rejection = atest::read_body_json(resp).await;
        assert!(!rejection.detail.is_empty());
        assert_eq!(rejection.body["payload"]["action"], "reset");
    }

    #[actix_web::test]
    async fn test_upstream_failure_is_an_empty_500() -> std::io::Result<()> {
        let _ = env_logger::builder().is_test(true).try_init();
        let (url, handle) = serve(StatusCode::SERVICE_UNAVAILABLE, "")?;

        let app = atest::init_service(
            App::new()
                .app_data(web::Data::new(OwidCovidArchive { url }))
                .app_data(web::Data::new(db_config()))
                .service(api_refresh),
        )
        .await;
        let req = atest::TestRequest::post()
            .uri("/refresh")
            .set_json(json!({"payload": {"action": "refresh"}}))
            .to_request();
        let resp = atest::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = atest::read_body(resp).await;
        assert!(body.is_empty());

        handle.stop(true).await;
        Ok(())
    }

    #[ignore]
    #[actix_web::test]
    async fn test_refresh_updates_country() -> Result<(), Box<dyn Error>> {
        let _ = env_logger::builder().is_test(true).try_init();
        let config = test_db()?;
        let client = seed_country(&config).await?;
        let (url, handle) = serve(StatusCode::OK, LIVE_CSV)?;

        let app = atest::init_service(
            App::new()
                .app_data(web::Data::new(OwidCovidArchive { url }))
                .app_data(web::Data::new(config))
                .service(api_refresh),
        )
        .await;
        let req = atest::TestRequest::post()
            .uri("/refresh")
            .set_json(json!({"payload": {"action": "refresh"}}))
            .to_request();
        let resp = atest::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(atest::read_body(resp).await.is_empty());

        let (latest, _, hospitalisations, _) = country_row(&client, "ZZA").await?;
        assert_eq!(latest, 25);
        assert_eq!(hospitalisations, 99);

        handle.stop(true).await;
        Ok(())
    }
}
