//! Hybrid retrieval against fake knowledge base, market and news sources

mod common;

use common::{
    knowledge_match, FakeMarket, FakeNews, FilteringKnowledgeBase, FixedEmbedder, InFlight,
    ThresholdKnowledgeBase,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tradesage::research::{cascade_search, HybridResearcher, MarketSnapshot, RetrievalConfig};

#[tokio::test]
async fn test_bundle_confidence_with_market_but_no_news() {
    let knowledge_base = ThresholdKnowledgeBase {
        at: 0.3,
        matches: vec![
            knowledge_match("Apple services outlook", "Services revenue keeps compounding.", 0.30),
            knowledge_match("Apple supply chain", "Assembly capacity shifts to India.", 0.40),
        ],
    };
    let researcher = HybridResearcher::new(
        Arc::new(FixedEmbedder),
        Arc::new(knowledge_base),
        Arc::new(FakeMarket::ok()),
        Arc::new(FakeNews::failing()),
        RetrievalConfig::default(),
    );

    let bundle = researcher.research("Apple will reach $220 by Q2 2025").await;

    assert_eq!(bundle.matched_threshold, Some(0.3));
    assert_eq!(bundle.historical_insights.len(), 2);
    assert!((bundle.average_similarity() - 0.35).abs() < 1e-9);
    assert!((bundle.bundle_confidence - 0.44).abs() < 1e-9);

    assert!(matches!(bundle.market_data.get("AAPL"), Some(MarketSnapshot::Ok { .. })));
    assert!(bundle.news_items.is_empty());
    assert!(bundle.source_errors.contains_key("news"));
    assert_eq!(bundle.data_source_counts["knowledge_base"], 2);
    assert_eq!(bundle.data_source_counts["market_data"], 1);
    assert!(bundle.summary.contains("Current Market Data:"));
    assert!(bundle.summary.contains("Historical Context:"));
}

#[tokio::test]
async fn test_cascade_reaches_lowest_threshold() {
    let knowledge_base = FilteringKnowledgeBase::new(vec![knowledge_match(
        "Oil demand note",
        "Refinery demand is softening.",
        0.25,
    )]);

    let (threshold, matches) = cascade_search(&knowledge_base, &[0.1; 8], &[0.4, 0.3, 0.2], 10)
        .await
        .unwrap();

    assert_eq!(threshold, Some(0.2));
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].similarity, 0.25);
    assert_eq!(*knowledge_base.thresholds_seen.lock().unwrap(), vec![0.4, 0.3, 0.2]);
}

#[tokio::test]
async fn test_cascade_stops_at_first_match() {
    let knowledge_base = FilteringKnowledgeBase::new(vec![
        knowledge_match("a", "first", 0.45),
        knowledge_match("b", "second", 0.35),
    ]);

    let (threshold, matches) = cascade_search(&knowledge_base, &[0.1; 8], &[0.4, 0.3, 0.2], 10)
        .await
        .unwrap();

    assert_eq!(threshold, Some(0.4));
    assert_eq!(matches.len(), 1);
    assert_eq!(knowledge_base.thresholds_seen.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_cascade_with_no_matches() {
    let knowledge_base = FilteringKnowledgeBase::new(vec![knowledge_match("c", "weak", 0.1)]);

    let (threshold, matches) = cascade_search(&knowledge_base, &[0.1; 8], &[0.4, 0.3, 0.2], 10)
        .await
        .unwrap();

    assert_eq!(threshold, None);
    assert!(matches.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_at_most_two_fetches_in_flight() {
    let tracker = Arc::new(InFlight::default());

    let mut knowledge_base = FilteringKnowledgeBase::new(Vec::new());
    knowledge_base.in_flight = Some(Arc::clone(&tracker));
    let market = FakeMarket {
        fail: false,
        in_flight: Some(Arc::clone(&tracker)),
    };
    let news = FakeNews {
        fail: false,
        in_flight: Some(Arc::clone(&tracker)),
    };

    let researcher = HybridResearcher::new(
        Arc::new(FixedEmbedder),
        Arc::new(knowledge_base),
        Arc::new(market),
        Arc::new(news),
        RetrievalConfig {
            thresholds: vec![0.4],
            ..Default::default()
        },
    );

    // Two instruments: four fetches in total
    let bundle = researcher.research("AAPL will outperform TSLA this year").await;

    assert_eq!(tracker.total.load(Ordering::SeqCst), 4);
    assert_eq!(tracker.max.load(Ordering::SeqCst), 2);
    assert_eq!(bundle.instruments, vec!["AAPL", "TSLA"]);
    assert_eq!(bundle.market_data.len(), 2);
    assert_eq!(bundle.news_items.len(), 1);
    assert!(bundle.source_errors.is_empty());
}
