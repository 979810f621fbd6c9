use actix_web::{App, HttpRequest, HttpResponse, HttpServer, Responder, get, middleware, web::Data};
use clap::Parser;
use kube::Client;
use operator::{
    config::Settings,
    label_watch::run_pod_watch,
    telemetry,
    user_controller::{State, run_user},
};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::*;

#[get("/health")]
async fn health(_: HttpRequest) -> impl Responder {
    HttpResponse::Ok().json("healthy")
}

#[get("/")]
async fn index(c: Data<State>, _req: HttpRequest) -> impl Responder {
    let d = c.diagnostics().await;
    HttpResponse::Ok().json(&d)
}

/// Cancel `token` on SIGINT or SIGTERM
async fn shutdown_on_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for SIGINT: {e}");
            std::future::pending::<()>().await;
        }
    };
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received SIGINT, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
        () = token.cancelled() => {}
    }
    token.cancel();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::parse();
    telemetry::init(settings.log_format)?;

    let client = Client::try_default().await?;
    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_on_signal(shutdown.clone()));

    // Initiatilize Kubernetes controller state
    let state = State::default();
    let user_ctrl = run_user(state.clone(), client.clone(), settings.clone(), shutdown.clone());
    let pod_watch = async {
        if settings.pod_watch {
            run_pod_watch(client.clone(), &settings, shutdown.clone()).await
        } else {
            Ok(())
        }
    };
    let server = HttpServer::new(move || {
        App::new()
            .app_data(Data::new(state.clone()))
            .wrap(middleware::Logger::default().exclude("/health"))
            .service(index)
            .service(health)
    })
    .bind(&settings.listen)?
    .disable_signals()
    .shutdown_timeout(5)
    .run();
    let server_handle = server.handle();
    let stop_server = async {
        shutdown.cancelled().await;
        server_handle.stop(true).await;
    };

    // A failing component takes the others down with it
    let user_ctrl = async {
        let res = user_ctrl.await;
        shutdown.cancel();
        res
    };
    let pod_watch = async {
        let res = pod_watch.await;
        if res.is_err() {
            shutdown.cancel();
        }
        res
    };
    let server = async {
        let res = server.await;
        shutdown.cancel();
        res
    };

    let (user_result, pod_result, server_result, ()) = tokio::join!(user_ctrl, pod_watch, server, stop_server);
    server_result?;
    user_result?;
    pod_result?;
    Ok(())
}
