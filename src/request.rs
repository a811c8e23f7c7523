//! HTTP request span construction.
//!
//! Builds server-side request spans from inbound `http` requests: extracts
//! remote trace context from the headers using the globally configured
//! OpenTelemetry propagator, records request attributes per the semantic
//! conventions, and starts the span as a new root *linked* to the remote
//! context when the extracted parent is remote, keeping each service's
//! traces locally rooted while preserving the caller's trace identity.
//!
//! Configure the propagator via `opentelemetry::global::set_text_map_propagator()`.

use crate::net::append_net_peer_attrs;
use http::Request;
use opentelemetry::global::{self, BoxedTracer};
use opentelemetry::propagation::Extractor;
use opentelemetry::trace::{Link, SpanKind, TraceContextExt, Tracer};
use opentelemetry::{Context, KeyValue};
use opentelemetry_semantic_conventions::attribute::{
    HTTP_REQUEST_METHOD_ORIGINAL, URL_PATH, URL_QUERY, USER_AGENT_ORIGINAL,
};
use std::fmt;

const HEADER_X_FORWARDED_FOR: &str = "x-forwarded-for";
const HEADER_FORWARDED: &str = "forwarded";
const HEADER_USER_AGENT: &str = "user-agent";

// Forwarding headers have no stable semconv key; surface them verbatim.
const ATTR_HEADER_X_FORWARDED_FOR: &str = "http.request.header.x_forwarded_for";
const ATTR_HEADER_FORWARDED: &str = "http.request.header.forwarded";

/// Starts request spans against a fixed tracer.
pub struct HttpSpanBuilder {
    tracer: BoxedTracer,
}

impl HttpSpanBuilder {
    /// Creates a builder using the globally registered tracer provider.
    pub fn new(scope_name: &'static str) -> Self {
        Self {
            tracer: global::tracer(scope_name),
        }
    }

    /// Starts a span for `request` and returns the context carrying it.
    ///
    /// `peer_addr` is the transport-level remote address (`host:port`)
    /// when the server knows it. If the extracted parent context is
    /// remote, the returned span is a new root linked to it; otherwise it
    /// is a child of whatever the propagator extracted.
    pub fn start<B>(
        &self,
        span_name: &str,
        request: &Request<B>,
        peer_addr: Option<&str>,
    ) -> Context {
        let parent_cx = global::get_text_map_propagator(|propagator| {
            propagator.extract(&HeaderMapExtractor(request.headers()))
        });

        let mut attrs = vec![KeyValue::new(
            HTTP_REQUEST_METHOD_ORIGINAL,
            request.method().as_str().to_owned(),
        )];

        if let Some(value) = header_str(request, HEADER_X_FORWARDED_FOR) {
            attrs.push(KeyValue::new(ATTR_HEADER_X_FORWARDED_FOR, value.to_owned()));
        }
        if let Some(value) = header_str(request, HEADER_FORWARDED) {
            attrs.push(KeyValue::new(ATTR_HEADER_FORWARDED, value.to_owned()));
        }
        if let Some(agent) = header_str(request, HEADER_USER_AGENT) {
            attrs.push(KeyValue::new(USER_AGENT_ORIGINAL, agent.to_owned()));
        }
        if let Some(peer) = peer_addr {
            append_net_peer_attrs(&mut attrs, peer);
        }

        attrs.push(KeyValue::new(URL_PATH, request.uri().path().to_owned()));
        if let Some(query) = request.uri().query().filter(|q| !q.is_empty()) {
            attrs.push(KeyValue::new(URL_QUERY, query.to_owned()));
        }

        let mut builder = self
            .tracer
            .span_builder(span_name.to_owned())
            .with_kind(SpanKind::Server)
            .with_attributes(attrs);

        let remote = parent_cx.span().span_context().clone();
        let span = if remote.is_valid() && remote.is_remote() {
            builder = builder.with_links(vec![Link::with_context(remote)]);
            self.tracer.build_with_context(builder, &Context::new())
        } else {
            self.tracer.build_with_context(builder, &parent_cx)
        };

        parent_cx.with_span(span)
    }
}

impl fmt::Debug for HttpSpanBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpSpanBuilder").finish_non_exhaustive()
    }
}

fn header_str<'a, B>(request: &'a Request<B>, name: &str) -> Option<&'a str> {
    request
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
}

/// Adapter to extract from http::HeaderMap using OTel's Extractor trait.
struct HeaderMapExtractor<'a>(&'a http::HeaderMap);

impl Extractor for HeaderMapExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(|k| k.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::trace::SpanId;
    use opentelemetry_sdk::propagation::TraceContextPropagator;
    use opentelemetry_sdk::trace::{InMemorySpanExporter, SdkTracerProvider, SimpleSpanProcessor};
    use serial_test::serial;

    const REMOTE_TRACEPARENT: &str = "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01";

    fn install_test_provider() -> InMemorySpanExporter {
        global::set_text_map_propagator(TraceContextPropagator::new());
        let exporter = InMemorySpanExporter::default();
        let provider = SdkTracerProvider::builder()
            .with_span_processor(SimpleSpanProcessor::new(exporter.clone()))
            .build();
        global::set_tracer_provider(provider);
        exporter
    }

    fn attribute<'a>(
        span: &'a opentelemetry_sdk::trace::SpanData,
        key: &str,
    ) -> Option<&'a opentelemetry::Value> {
        span.attributes
            .iter()
            .find(|kv| kv.key.as_str() == key)
            .map(|kv| &kv.value)
    }

    #[test]
    #[serial]
    fn remote_parent_starts_linked_new_root() {
        let exporter = install_test_provider();
        let builder = HttpSpanBuilder::new("request-tests");

        let request = http::Request::builder()
            .method("POST")
            .uri("/orders?limit=10")
            .header("traceparent", REMOTE_TRACEPARENT)
            .body(())
            .unwrap();

        let cx = builder.start("POST /orders", &request, None);
        cx.span().end();

        let spans = exporter.get_finished_spans().unwrap();
        assert_eq!(spans.len(), 1);
        let span = &spans[0];

        assert_eq!(span.parent_span_id, SpanId::INVALID);
        assert_ne!(
            span.span_context.trace_id().to_string(),
            "4bf92f3577b34da6a3ce929d0e0e4736"
        );

        assert_eq!(span.links.links.len(), 1);
        assert_eq!(
            span.links.links[0].span_context.trace_id().to_string(),
            "4bf92f3577b34da6a3ce929d0e0e4736"
        );
    }

    #[test]
    #[serial]
    fn local_request_starts_plain_root_without_links() {
        let exporter = install_test_provider();
        let builder = HttpSpanBuilder::new("request-tests");

        let request = http::Request::builder()
            .method("GET")
            .uri("/health")
            .body(())
            .unwrap();

        let cx = builder.start("GET /health", &request, None);
        cx.span().end();

        let spans = exporter.get_finished_spans().unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].parent_span_id, SpanId::INVALID);
        assert!(spans[0].links.links.is_empty());
    }

    #[test]
    #[serial]
    fn records_request_attributes() {
        let exporter = install_test_provider();
        let builder = HttpSpanBuilder::new("request-tests");

        let request = http::Request::builder()
            .method("GET")
            .uri("/users/7?expand=orders")
            .header("user-agent", "curl/8.5.0")
            .header("x-forwarded-for", "203.0.113.9")
            .header("forwarded", "for=203.0.113.9;proto=https")
            .body(())
            .unwrap();

        let cx = builder.start("GET /users/{id}", &request, Some("10.1.2.3:55001"));
        cx.span().end();

        let spans = exporter.get_finished_spans().unwrap();
        let span = &spans[0];

        assert_eq!(
            attribute(span, "http.request.method_original").unwrap().to_string(),
            "GET"
        );
        assert_eq!(attribute(span, "url.path").unwrap().to_string(), "/users/7");
        assert_eq!(
            attribute(span, "url.query").unwrap().to_string(),
            "expand=orders"
        );
        assert_eq!(
            attribute(span, "user_agent.original").unwrap().to_string(),
            "curl/8.5.0"
        );
        assert_eq!(
            attribute(span, "http.request.header.x_forwarded_for")
                .unwrap()
                .to_string(),
            "203.0.113.9"
        );
        assert_eq!(
            attribute(span, "http.request.header.forwarded")
                .unwrap()
                .to_string(),
            "for=203.0.113.9;proto=https"
        );
        assert_eq!(
            attribute(span, "network.peer.address").unwrap().to_string(),
            "10.1.2.3"
        );
        assert_eq!(
            attribute(span, "network.peer.port").unwrap().to_string(),
            "55001"
        );
    }

    #[test]
    #[serial]
    fn invalid_traceparent_falls_back_to_plain_root() {
        let exporter = install_test_provider();
        let builder = HttpSpanBuilder::new("request-tests");

        let request = http::Request::builder()
            .method("GET")
            .uri("/")
            .header("traceparent", "invalid")
            .body(())
            .unwrap();

        let cx = builder.start("GET /", &request, None);
        cx.span().end();

        let spans = exporter.get_finished_spans().unwrap();
        assert!(spans[0].links.links.is_empty());
    }
}
