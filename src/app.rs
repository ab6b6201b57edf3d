use crate::config::{AppConfig, HTTPConfig, Secrets};
use crate::gemini::GeminiClient;
use crate::http::{create_app, HttpState};
use crate::line::LineClient;
use crate::relay::Relay;
use crate::TracingReloadHandle;
use anyhow::Result;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::log::{error, info};

#[cfg(feature = "sentry")]
pub type SentryGuard = Option<sentry::ClientInitGuard>;

#[cfg(not(feature = "sentry"))]
pub type SentryGuard = Option<()>;

pub struct AppHandles {
    tasks: Vec<(&'static str, JoinHandle<()>)>,
    _sentry_guard: SentryGuard,
}
impl AppHandles {
    pub fn new(
        config: AppConfig,
        secrets: Secrets,
        tracing_reload: TracingReloadHandle,
        _sentry_guard: SentryGuard,
    ) -> Result<AppHandles> {
        let mut tasks = Vec::new();

        // Both API clients are built once and shared read-only by every request.
        let completions = Arc::new(GeminiClient::new(&config.gemini, secrets.gemini_api_key)?);
        let messaging = Arc::new(LineClient::new(&config.line, secrets.channel_access_token)?);

        let persona = Arc::new(config.persona);
        info!(
            "Replying with {} ({})",
            persona.model,
            if persona.system_instruction.is_some() {
                "custom persona"
            } else {
                "no system instruction"
            }
        );

        let relay = Relay::new(completions, messaging, persona, &config.relay);
        let state = HttpState {
            relay,
            channel_secret: Arc::from(secrets.channel_secret),
            tracing_reload,
        };

        let http_handle = Self::start_http_server(config.http, state, _sentry_guard.is_some())?;
        tasks.push(("HTTP Server", http_handle));

        Ok(AppHandles {
            tasks,
            _sentry_guard,
        })
    }

    pub async fn run(self) {
        let futures: Vec<_> = self
            .tasks
            .into_iter()
            .map(|(name, handle)| {
                info!("Starting task: {name}");
                Box::pin(async move {
                    match handle.await {
                        Ok(_) => error!("{name} task completed!"),
                        Err(e) => error!("{name} task failed: {e:?}!"),
                    }
                })
            })
            .collect();

        // Tasks are expected to run forever, so any exit ends the process.
        futures::future::select_all(futures).await;
    }

    fn start_http_server(
        config: HTTPConfig,
        state: HttpState,
        sentry_enabled: bool,
    ) -> Result<JoinHandle<()>> {
        let address = config.address;
        let tls_config = config.tls.clone();

        let admin_token = if config.admin_enabled {
            std::env::var("RELAY_HTTP_AUTH_TOKEN").ok()
        } else {
            None
        };
        let app = create_app(&config, state, admin_token, sentry_enabled)?;

        let handle = tokio::spawn(async move {
            let result = match tls_config {
                Some(_tls_config) => {
                    #[cfg(any(feature = "tls-rustls", feature = "tls-native"))]
                    {
                        info!("Starting HTTPS (secure) server on {address}");

                        #[cfg(feature = "tls-rustls")]
                        {
                            let _ = rustls::crypto::CryptoProvider::install_default(
                                rustls::crypto::aws_lc_rs::default_provider(),
                            );
                            match axum_server::tls_rustls::RustlsConfig::from_pem_file(
                                &_tls_config.certificate_path,
                                &_tls_config.key_path,
                            )
                            .await
                            {
                                Ok(tls) => axum_server::bind_rustls(address, tls)
                                    .serve(app.into_make_service())
                                    .await
                                    .map_err(anyhow::Error::from),
                                Err(e) => Err(anyhow::anyhow!(
                                    "Failed to load rustls TLS certificates: {e}"
                                )),
                            }
                        }

                        #[cfg(all(feature = "tls-native", not(feature = "tls-rustls")))]
                        {
                            match axum_server::tls_openssl::OpenSSLConfig::from_pem_file(
                                &_tls_config.certificate_path,
                                &_tls_config.key_path,
                            ) {
                                Ok(tls) => axum_server::bind_openssl(address, tls)
                                    .serve(app.into_make_service())
                                    .await
                                    .map_err(anyhow::Error::from),
                                Err(e) => Err(anyhow::anyhow!(
                                    "Failed to load openssl TLS certificates: {e}"
                                )),
                            }
                        }
                    }

                    #[cfg(not(any(feature = "tls-rustls", feature = "tls-native")))]
                    Err(anyhow::anyhow!(
                        "HTTP Server TLS configuration provided but no TLS features enabled. Compile with a TLS backend feature!"
                    ))
                }
                None => {
                    info!("Starting HTTP (insecure) server on {address}");
                    axum_server::bind(address)
                        .serve(app.into_make_service())
                        .await
                        .map_err(anyhow::Error::from)
                }
            };

            if let Err(e) = result {
                error!("Server error: {e:?}");
            }
        });

        Ok(handle)
    }
}
