use crate::{
    api::{attendance_admin, employee, location_admin, mobile_attendance},
    auth::{handlers, middleware::auth_middleware},
    config::Config,
};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};
use std::sync::Arc;

pub fn configure(cfg: &mut web::ServiceConfig, config: Config) {
    // Helper to build per-route limiter
    fn build_limiter(requests_per_min: u32) -> Governor<PeerIpKeyExtractor, NoOpMiddleware> {
        let per_ms = if requests_per_min == 0 {
            1
        } else {
            60_000 / requests_per_min as u64
        };
        let cfg = GovernorConfigBuilder::default()
            .per_millisecond(per_ms)
            .burst_size(requests_per_min)
            .key_extractor(PeerIpKeyExtractor)
            .finish()
            .unwrap();
        Governor::new(&cfg)
    }

    let login_limiter = Arc::new(build_limiter(config.rate_login_per_min));
    let register_limiter = Arc::new(build_limiter(config.rate_register_per_min));
    let refresh_limiter = Arc::new(build_limiter(config.rate_refresh_per_min));
    let protected_limiter = Arc::new(build_limiter(config.rate_protected_per_min));

    // Public routes (register still checks the caller's token itself)
    cfg.service(
        web::scope("/auth")
            .service(
                web::resource("/login")
                    .wrap(login_limiter.clone())
                    .route(web::post().to(handlers::login)),
            )
            .service(
                web::resource("/register")
                    .wrap(register_limiter.clone())
                    .route(web::post().to(handlers::register)),
            )
            .service(
                web::resource("/refresh")
                    .wrap(refresh_limiter.clone())
                    .route(web::post().to(handlers::refresh_token)),
            )
            .service(
                web::resource("/logout")
                    .wrap(login_limiter.clone())
                    .route(web::post().to(handlers::logout)),
            ),
    );

    // Protected routes
    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(auth_middleware))
            .wrap(protected_limiter)
            .service(
                web::scope("/mobile-attendance")
                    .service(
                        web::resource("/locations")
                            .route(web::get().to(mobile_attendance::get_locations)),
                    )
                    .service(
                        web::resource("/today-status")
                            .route(web::get().to(mobile_attendance::today_status)),
                    )
                    .service(
                        web::resource("/validate-location")
                            .route(web::post().to(mobile_attendance::validate_location)),
                    )
                    .service(
                        web::resource("/submit").route(web::post().to(mobile_attendance::submit)),
                    )
                    .service(
                        web::resource("/history").route(web::get().to(mobile_attendance::history)),
                    )
                    .service(
                        web::resource("/avatar").route(web::get().to(mobile_attendance::avatar)),
                    ),
            )
            .service(
                web::scope("/locations")
                    // /locations
                    .service(
                        web::resource("")
                            .route(web::post().to(location_admin::create_location))
                            .route(web::get().to(location_admin::list_locations)),
                    )
                    // /locations/{id}
                    .service(
                        web::resource("/{id}")
                            .route(web::put().to(location_admin::update_location))
                            .route(web::delete().to(location_admin::delete_location)),
                    ),
            )
            .service(
                web::scope("/attendance-records")
                    // /attendance-records
                    .service(
                        web::resource("").route(web::get().to(attendance_admin::list_records)),
                    )
                    // /attendance-records/{id}
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(attendance_admin::get_record))
                            .route(web::delete().to(attendance_admin::delete_record)),
                    ),
            )
            .service(
                web::scope("/employees")
                    .service(web::resource("/me").route(web::get().to(employee::me)))
                    .service(
                        web::resource("/photo/{path:.*}").route(web::get().to(employee::photo)),
                    ),
            ),
    );
}
