//! Contract checks that every adapter produces the same canonical shapes from
//! its own upstream schema.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::Value;
use tickbridge_core::{
    AlphaVantageAdapter, DataSource, DateWindow, Endpoint, FinnhubAdapter, HistoricalRequest,
    Interval, OptionsChainRequest, PolygonAdapter, ProfileRequest, ProviderConfig, ProviderId,
    QuoteRequest, SourceErrorKind, StubHttpClient,
};
use tickbridge_tests::{aapl, ALPHAVANTAGE_BASE, FINNHUB_BASE, POLYGON_BASE};

fn fixtures() -> StubHttpClient {
    StubHttpClient::new()
        // finnhub
        .with_json(
            "finnhub.test/api/v1/quote",
            r#"{"c":185.2,"d":-0.4,"dp":-0.2155,"h":186.1,"l":183.9,"o":184.5,"pc":185.6,"t":1704412800}"#,
        )
        .with_json(
            "finnhub.test/api/v1/stock/profile2",
            r#"{"name":"Apple Inc","exchange":"NASDAQ NMS - GLOBAL MARKET","finnhubIndustry":"Technology","marketCapitalization":2870000,"logo":"https://static.finnhub.io/logo/aapl.png","weburl":"https://www.apple.com/"}"#,
        )
        .with_json(
            "finnhub.test/api/v1/stock/candle",
            r#"{"s":"ok",
                "t":[1704326400,1704153600,1704240000,1704240000,1704672000],
                "o":[182,187,184,184,181],"h":[183,188,185,185,182],"l":[180,186,183,183,180],
                "c":[181.9,185.6,184.3,184.3,181.2],"v":[100,200,300,300,400]}"#,
        )
        .with_json(
            "finnhub.test/api/v1/stock/option-chain",
            r#"{"code":"AAPL","data":[
                {"expirationDate":"2024-03-15","options":{"CALL":[{"contractName":"AAPL240315C00190000","strike":190,"lastPrice":3.2}],"PUT":[]}},
                {"expirationDate":"2024-02-16","options":{"CALL":[],"PUT":[{"contractName":"AAPL240216P00180000","strike":180,"lastPrice":1.1,"volume":55}]}},
                {"expirationDate":"2024-03-15","options":{"CALL":[],"PUT":[]}}
            ]}"#,
        )
        // alpha vantage
        .with_json(
            "function=GLOBAL_QUOTE",
            r#"{"Global Quote":{"01. symbol":"AAPL","02. open":"184.5000","03. high":"186.1000","04. low":"183.9000","05. price":"185.2000","06. volume":"52000000","07. latest trading day":"2024-01-05","08. previous close":"185.6000","09. change":"-0.4000","10. change percent":"-0.2155%"}}"#,
        )
        .with_json(
            "function=OVERVIEW",
            r#"{"Symbol":"AAPL","Name":"Apple Inc","Exchange":"NASDAQ","Industry":"ELECTRONIC COMPUTERS","MarketCapitalization":"2870000000000","OfficialSite":"None"}"#,
        )
        .with_json(
            "function=TIME_SERIES_DAILY",
            r#"{"Meta Data":{"2. Symbol":"AAPL"},"Time Series (Daily)":{
                "2024-01-08":{"1. open":"181","2. high":"182","3. low":"180","4. close":"181.2","5. volume":"400"},
                "2024-01-04":{"1. open":"182","2. high":"183","3. low":"180","4. close":"181.9","5. volume":"100"},
                "2024-01-02":{"1. open":"187","2. high":"188","3. low":"186","4. close":"185.6","5. volume":"200"},
                "2024-01-03":{"1. open":"184","2. high":"185","3. low":"183","4. close":"184.3","5. volume":"300"}
            }}"#,
        )
        // polygon
        .with_json(
            "polygon.test/v2/snapshot/locale/us/markets/stocks/tickers/AAPL",
            r#"{"status":"OK","ticker":{"ticker":"AAPL","todaysChange":-0.4,"todaysChangePerc":-0.2155,
                "day":{"o":184.5,"h":186.1,"l":183.9,"c":185.2,"v":52000000},
                "lastTrade":{"p":185.2},"prevDay":{"c":185.6}}}"#,
        )
        .with_json(
            "polygon.test/v3/reference/tickers/AAPL",
            r#"{"status":"OK","results":{"ticker":"AAPL","name":"Apple Inc.","primary_exchange":"XNAS","market_cap":2870000000000}}"#,
        )
        .with_json(
            "polygon.test/v2/aggs/ticker/AAPL",
            r#"{"status":"OK","results":[
                {"t":1704326400000,"o":182,"h":183,"l":180,"c":181.9,"v":100},
                {"t":1704153600000,"o":187,"h":188,"l":186,"c":185.6,"v":200},
                {"t":1704240000000,"o":184,"h":185,"l":183,"c":184.3,"v":300},
                {"t":1704240000000,"o":184,"h":185,"l":183,"c":184.3,"v":300},
                {"t":1704672000000,"o":181,"h":182,"l":180,"c":181.2,"v":400}
            ]}"#,
        )
        .with_json(
            "polygon.test/v3/snapshot/options/AAPL",
            r#"{"status":"OK","results":[
                {"details":{"contract_type":"call","expiration_date":"2024-03-15","strike_price":190,"ticker":"O:AAPL240315C00190000"},"day":{"close":3.2}},
                {"details":{"contract_type":"put","expiration_date":"2024-02-16","strike_price":180,"ticker":"O:AAPL240216P00180000"},"last_trade":{"price":1.1},"open_interest":900}
            ]}"#,
        )
}

struct ProviderCase {
    id: ProviderId,
    source: Arc<dyn DataSource>,
    supports_options: bool,
}

fn provider_cases() -> Vec<ProviderCase> {
    let http = Arc::new(fixtures());
    vec![
        ProviderCase {
            id: ProviderId::Finnhub,
            source: Arc::new(FinnhubAdapter::new(
                http.clone(),
                ProviderConfig::new("fh").with_base_url(FINNHUB_BASE),
            )),
            supports_options: true,
        },
        ProviderCase {
            id: ProviderId::Alphavantage,
            source: Arc::new(AlphaVantageAdapter::new(
                http.clone(),
                ProviderConfig::new("av").with_base_url(ALPHAVANTAGE_BASE),
            )),
            supports_options: false,
        },
        ProviderCase {
            id: ProviderId::Polygon,
            source: Arc::new(PolygonAdapter::new(
                http,
                ProviderConfig::new("pg").with_base_url(POLYGON_BASE),
            )),
            supports_options: true,
        },
    ]
}

fn keys(value: &Value) -> BTreeSet<&str> {
    value
        .as_object()
        .expect("object")
        .keys()
        .map(String::as_str)
        .collect()
}

#[tokio::test]
async fn quote_has_the_canonical_shape_for_all_providers() {
    let expected_keys = BTreeSet::from([
        "symbol",
        "price",
        "change",
        "percentChange",
        "high",
        "low",
        "open",
        "previousClose",
        "timestamp",
        "source",
    ]);

    for case in provider_cases() {
        let quote = case
            .source
            .quote(QuoteRequest::new(aapl()))
            .await
            .unwrap_or_else(|error| panic!("provider '{}' quote failed: {error}", case.id));

        assert_eq!(quote.symbol.as_str(), "AAPL", "provider '{}'", case.id);
        assert_eq!(quote.source, case.id);
        assert!((quote.price - 185.2).abs() < 1e-9, "provider '{}'", case.id);
        assert_eq!(quote.previous_close, Some(185.6), "provider '{}'", case.id);

        let json = serde_json::to_value(&quote).expect("serializable");
        assert_eq!(keys(&json), expected_keys, "provider '{}'", case.id);
        assert_eq!(json["source"], case.id.as_str());
    }
}

#[tokio::test]
async fn profile_has_required_name_and_nullable_extras() {
    for case in provider_cases() {
        let profile = case
            .source
            .profile(ProfileRequest::new(aapl()))
            .await
            .unwrap_or_else(|error| panic!("provider '{}' profile failed: {error}", case.id));

        assert!(profile.name.starts_with("Apple Inc"), "provider '{}'", case.id);
        assert_eq!(profile.source, case.id);
        assert_eq!(
            profile.market_cap,
            Some(2_870_000_000_000.0),
            "provider '{}': market cap in absolute units",
            case.id
        );

        let json = serde_json::to_value(&profile).expect("serializable");
        for key in ["exchange", "industry", "marketCap", "logo", "weburl"] {
            assert!(json.get(key).is_some(), "provider '{}': key {key}", case.id);
        }
    }
}

#[tokio::test]
async fn series_is_ascending_unique_and_windowed_for_all_providers() {
    let window = DateWindow::parse("2024-01-02", "2024-01-05").expect("window");

    for case in provider_cases() {
        let series = case
            .source
            .historical(HistoricalRequest::new(aapl(), Interval::OneDay, window))
            .await
            .unwrap_or_else(|error| panic!("provider '{}' historical failed: {error}", case.id));

        assert_eq!(series.source, case.id);
        assert_eq!(series.interval, Interval::OneDay);
        assert_eq!(
            series.closes(),
            vec![185.6, 184.3, 181.9],
            "provider '{}'",
            case.id
        );
        assert!(
            series
                .data
                .windows(2)
                .all(|pair| pair[0].timestamp < pair[1].timestamp),
            "provider '{}': strictly ascending",
            case.id
        );
        assert!(series.data.iter().all(|bar| window.contains(bar.timestamp)));
        assert!(series.data.iter().all(|bar| bar.volume.is_some()));
    }
}

#[tokio::test]
async fn options_chain_dates_are_sorted_and_deduplicated() {
    for case in provider_cases() {
        let result = case
            .source
            .options_chain(OptionsChainRequest::new(aapl()))
            .await;

        if !case.supports_options {
            let error = result.expect_err("options unsupported");
            assert_eq!(error.kind(), SourceErrorKind::UnsupportedEndpoint);
            assert!(!case.source.capabilities().supports(Endpoint::OptionsChain));
            continue;
        }

        let chain =
            result.unwrap_or_else(|error| panic!("provider '{}' options failed: {error}", case.id));
        assert_eq!(chain.source, case.id);
        assert_eq!(chain.expiration_dates, vec!["2024-02-16", "2024-03-15"]);
        assert_eq!(chain.options.len(), 2, "provider '{}'", case.id);
        assert!(chain
            .options
            .iter()
            .all(|contract| chain.expiration_dates.contains(&contract.expiration)));

        let json = serde_json::to_value(&chain).expect("serializable");
        assert!(json["options"][0].get("type").is_some());
        assert!(json["options"][0].get("contractSymbol").is_some());
        assert!(json.get("expirationDates").is_some());
    }
}
