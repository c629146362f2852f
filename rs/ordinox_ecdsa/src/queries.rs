use crate::endpoints::{GetEventsArg, GetEventsResult};
use crate::logs::{render_entries, LogFilter};
use crate::metrics::encode_metrics;
use crate::storage;
use ic_http_types::{HttpRequest, HttpResponse, HttpResponseBuilder};

/// Maximum number of events returned by a single `get_events` call.
pub const MAX_EVENTS_PER_RESPONSE: u64 = 2_000;

const MAX_BODY_SIZE: usize = 2_000_000;

pub fn get_events(arg: GetEventsArg) -> GetEventsResult {
    let length = arg.length.min(MAX_EVENTS_PER_RESPONSE);
    GetEventsResult {
        events: storage::events_in(arg.start..arg.start.saturating_add(length)).collect(),
        total_event_count: storage::count_events(),
    }
}

pub fn http_request(req: HttpRequest, now_nanos: u64) -> HttpResponse {
    match req.path() {
        "/metrics" => {
            let mut writer =
                ic_metrics_encoder::MetricsEncoder::new(vec![], now_nanos as i64 / 1_000_000);

            match encode_metrics(&mut writer) {
                Ok(()) => HttpResponseBuilder::ok()
                    .header("Content-Type", "text/plain; version=0.0.4")
                    .header("Cache-Control", "no-store")
                    .with_body_and_content_length(writer.into_inner())
                    .build(),
                Err(err) => {
                    HttpResponseBuilder::server_error(format!("Failed to encode metrics: {err}"))
                        .build()
                }
            }
        }
        "/logs" => match LogFilter::from_query(|name| req.raw_query_param(name)) {
            Ok(filter) => HttpResponseBuilder::ok()
                .header("Content-Type", "application/json; charset=utf-8")
                .with_body_and_content_length(render_entries(&filter.select(), MAX_BODY_SIZE))
                .build(),
            Err(reason) => HttpResponseBuilder::bad_request()
                .with_body_and_content_length(reason)
                .build(),
        },
        _ => HttpResponseBuilder::not_found().build(),
    }
}
