//! Yahoo Finance and Central Bank clients against a local mock server

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::time::{Duration, Instant};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use eva_valuation::api::{BcbClient, EconomicDataProvider, MarketDataProvider, YahooClient};
use eva_valuation::models::{Config, EconomicSeries};

fn config_for(server: &MockServer) -> Config {
    Config {
        yahoo_base_url: server.uri(),
        yahoo_cookie_url: format!("{}/", server.uri()),
        bcb_base_url: server.uri(),
        ..Config::default()
    }
}

/// Cookie page and crumb endpoint; quote calls without a valid crumb get 401
async fn mount_session(server: &MockServer, crumb: &str) {
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(404).insert_header("set-cookie", "A3=session; Path=/"))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/test/getcrumb"))
        .respond_with(ResponseTemplate::new(200).set_body_string(crumb))
        .mount(server)
        .await;
}

async fn mount_crumb_rejection(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/v7/finance/quote"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(json!({ "finance": { "error": { "code": "Unauthorized", "description": "Invalid Crumb" } } })),
        )
        .mount(server)
        .await;
}

fn petr4_quote() -> serde_json::Value {
    json!({
        "quoteResponse": {
            "result": [{
                "symbol": "PETR4.SA",
                "shortName": "PETROBRAS   PN      N2",
                "regularMarketPrice": 31.5,
                "sharesOutstanding": 5_000_000.0,
                "marketCap": 157_500_000.0
            }],
            "error": null
        }
    })
}

#[test_log::test(tokio::test)]
async fn test_yahoo_quote_maps_snapshot_fields() {
    let server = MockServer::start().await;
    mount_session(&server, "cRuMb.1").await;
    Mock::given(method("GET"))
        .and(path("/v7/finance/quote"))
        .and(query_param("symbols", "PETR4.SA"))
        .and(query_param("crumb", "cRuMb.1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(petr4_quote()))
        .expect(2)
        .mount(&server)
        .await;
    mount_crumb_rejection(&server).await;

    let client = YahooClient::new(&config_for(&server)).unwrap();
    let snapshot = client.get_quote("PETR4.SA").await.unwrap();

    assert_eq!(snapshot.price, Some(31.5));
    assert_eq!(snapshot.shares_outstanding, Some(5_000_000.0));
    assert_eq!(snapshot.market_cap, Some(157_500_000.0));
    assert_eq!(snapshot.short_name.as_deref(), Some("PETROBRAS   PN      N2"));

    // the crumb is reused for the next quote
    client.get_quote("PETR4.SA").await.unwrap();
    let crumb_calls = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|request| request.url.path() == "/v1/test/getcrumb")
        .count();
    assert_eq!(crumb_calls, 1);
}

#[test_log::test(tokio::test)]
async fn test_yahoo_quote_refreshes_a_rejected_crumb() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/test/getcrumb"))
        .respond_with(ResponseTemplate::new(200).set_body_string("stale"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/test/getcrumb"))
        .respond_with(ResponseTemplate::new(200).set_body_string("fresh"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v7/finance/quote"))
        .and(query_param("crumb", "fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(petr4_quote()))
        .expect(1)
        .mount(&server)
        .await;
    mount_crumb_rejection(&server).await;

    let client = YahooClient::new(&config_for(&server)).unwrap();
    let snapshot = client.get_quote("PETR4.SA").await.unwrap();
    assert_eq!(snapshot.price, Some(31.5));
}

#[test_log::test(tokio::test)]
async fn test_yahoo_quote_without_crumb_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/test/getcrumb"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<!DOCTYPE html><html></html>"))
        .mount(&server)
        .await;
    mount_crumb_rejection(&server).await;

    let client = YahooClient::new(&config_for(&server)).unwrap();
    let error = client.get_quote("PETR4.SA").await.unwrap_err();
    assert!(error.to_string().contains("crumb"), "{}", error);
}

#[test_log::test(tokio::test)]
async fn test_yahoo_quote_without_result_is_an_error() {
    let server = MockServer::start().await;
    mount_session(&server, "c1").await;
    Mock::given(method("GET"))
        .and(path("/v7/finance/quote"))
        .and(query_param("crumb", "c1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "quoteResponse": { "result": [], "error": null }
        })))
        .mount(&server)
        .await;

    let client = YahooClient::new(&config_for(&server)).unwrap();
    assert!(client.get_quote("XXXX3.SA").await.is_err());
}

#[test_log::test(tokio::test)]
async fn test_slow_quote_is_cut_off_by_the_http_timeout() {
    let server = MockServer::start().await;
    mount_session(&server, "c1").await;
    Mock::given(method("GET"))
        .and(path("/v7/finance/quote"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(petr4_quote())
                .set_delay(Duration::from_secs(10)),
        )
        .mount(&server)
        .await;

    let config = Config {
        http_timeout: Duration::from_millis(300),
        ..config_for(&server)
    };
    let client = YahooClient::new(&config).unwrap();

    let started = Instant::now();
    assert!(client.get_quote("PETR4.SA").await.is_err());
    assert!(started.elapsed() < Duration::from_secs(5), "took {:?}", started.elapsed());
}

#[test_log::test(tokio::test)]
async fn test_slow_rate_series_is_cut_off_by_the_rates_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/dados/serie/bcdata.sgs.432/dados/ultimos/1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([{ "data": "01/09/2025", "valor": "15.00" }]))
                .set_delay(Duration::from_secs(10)),
        )
        .mount(&server)
        .await;

    let config = Config {
        rates_timeout: Duration::from_millis(300),
        ..config_for(&server)
    };
    let client = BcbClient::new(&config).unwrap();

    let started = Instant::now();
    assert!(client.latest_observation(EconomicSeries::Selic).await.is_err());
    assert!(started.elapsed() < Duration::from_secs(5), "took {:?}", started.elapsed());
}

#[test_log::test(tokio::test)]
async fn test_yahoo_history_reads_adjusted_closes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v8/finance/chart/VALE3.SA"))
        .and(query_param("range", "5y"))
        .and(query_param("interval", "1d"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "chart": {
                "result": [{
                    "timestamp": [1704204000, 1704290400, 1704376800],
                    "indicators": {
                        "quote": [{ "close": [70.0, 71.0, 72.0] }],
                        "adjclose": [{ "adjclose": [65.0, null, 67.0] }]
                    }
                }],
                "error": null
            }
        })))
        .mount(&server)
        .await;

    let client = YahooClient::new(&config_for(&server)).unwrap();
    let history = client.get_price_history("VALE3.SA", "5y").await.unwrap();

    let closes: Vec<Option<f64>> = history.iter().map(|p| p.adj_close).collect();
    assert_eq!(closes, vec![Some(65.0), None, Some(67.0)]);
}

#[test_log::test(tokio::test)]
async fn test_yahoo_http_failure_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429).set_body_string("Too Many Requests"))
        .mount(&server)
        .await;

    let client = YahooClient::new(&config_for(&server)).unwrap();
    let error = client.get_price_history("VALE3.SA", "5y").await.unwrap_err();
    assert!(error.to_string().contains("429"), "{}", error);
}

#[test_log::test(tokio::test)]
async fn test_bcb_latest_observation() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/dados/serie/bcdata.sgs.433/dados/ultimos/1"))
        .and(query_param("formato", "json"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{ "data": "01/08/2025", "valor": "-0.11" }])),
        )
        .mount(&server)
        .await;

    let client = BcbClient::new(&config_for(&server)).unwrap();
    let observation = client.latest_observation(EconomicSeries::Ipca).await.unwrap();
    assert_eq!(observation.value, -0.11);
    assert_eq!(observation.date.format("%m/%Y").to_string(), "08/2025");

    // no mock for the Selic series: 404
    assert_matches!(client.latest_observation(EconomicSeries::Selic).await, Err(_));
}
