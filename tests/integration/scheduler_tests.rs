use super::*;

#[tokio::test]
async fn test_scheduled_run_alerts_below_target() -> anyhow::Result<()> {
    let renderer = StaticPageRenderer::new().with_page(LAPTOP_URL, price_page("$19.99 CAD"));
    let app = create_test_app(renderer).await?;
    track(&app, "laptop", LAPTOP_URL, Some(Decimal::new(2000, 2))).await?;

    let summary = app.scheduler.run_once().await.expect("run should not be skipped");
    assert_eq!(summary.priced, 1);
    assert_eq!(summary.alerts_sent, 1);

    let alert = alerts_to(&app, OWNER).pop().expect("alert delivered");
    assert!(alert.contains("Price Drop Alert"));
    assert!(alert.contains("$19.99"));
    assert!(alert.contains("$20.00"));
    assert!(alert.contains(LAPTOP_URL));
    Ok(())
}

#[tokio::test]
async fn test_target_boundary() -> anyhow::Result<()> {
    let renderer = StaticPageRenderer::new()
        .with_page("https://example.com/equal", price_page("$20.00"))
        .with_page("https://example.com/above", price_page("$20.01"))
        .with_page("https://example.com/below", price_page("$19.99"));
    let app = create_test_app(renderer).await?;
    let target = Some(Decimal::new(2000, 2));
    track(&app, "equal", "https://example.com/equal", target).await?;
    track(&app, "above", "https://example.com/above", target).await?;
    track(&app, "below", "https://example.com/below", target).await?;

    let summary = app.scheduler.run_once().await.expect("run should not be skipped");
    assert_eq!(summary.alerts_sent, 2);

    let alerts = alerts_to(&app, OWNER);
    assert!(alerts.iter().any(|a| a.contains("equal")));
    assert!(alerts.iter().any(|a| a.contains("below")));
    assert!(!alerts.iter().any(|a| a.contains("above")));
    Ok(())
}

#[tokio::test]
async fn test_every_run_alerts_again() -> anyhow::Result<()> {
    let renderer = StaticPageRenderer::new().with_page(LAPTOP_URL, price_page("$19.99"));
    let app = create_test_app(renderer).await?;
    track(&app, "laptop", LAPTOP_URL, Some(Decimal::new(2000, 2))).await?;

    for _ in 0..3 {
        app.scheduler.run_once().await.expect("run should not be skipped");
    }
    assert_eq!(alerts_to(&app, OWNER).len(), 3);
    Ok(())
}

#[tokio::test]
async fn test_unreachable_product_is_skipped() -> anyhow::Result<()> {
    let renderer = StaticPageRenderer::new().with_page(LAPTOP_URL, price_page("$19.99"));
    let app = create_test_app(renderer).await?;
    track(&app, "broken", UNREACHABLE_URL, Some(Decimal::ONE_HUNDRED)).await?;
    track(&app, "laptop", LAPTOP_URL, Some(Decimal::new(2000, 2))).await?;

    let summary = app.scheduler.run_once().await.expect("run should not be skipped");
    assert_eq!(summary.checked, 2);
    assert_eq!(summary.unavailable, 1);
    assert_eq!(summary.alerts_sent, 1);
    Ok(())
}

#[tokio::test]
async fn test_products_without_target_never_alert() -> anyhow::Result<()> {
    let renderer = StaticPageRenderer::new().with_page(LAPTOP_URL, price_page("$0.01"));
    let app = create_test_app(renderer).await?;
    track(&app, "laptop", LAPTOP_URL, None).await?;

    let summary = app.scheduler.run_once().await.expect("run should not be skipped");
    assert_eq!(summary.priced, 1);
    assert_eq!(summary.alerts_sent, 0);
    assert!(alerts_to(&app, OWNER).is_empty());
    Ok(())
}

#[tokio::test]
async fn test_browser_sessions_are_released() -> anyhow::Result<()> {
    let renderer = StaticPageRenderer::new().with_page(LAPTOP_URL, price_page("$19.99"));
    let app = create_test_app(renderer).await?;
    track(&app, "laptop", LAPTOP_URL, None).await?;
    track(&app, "broken", UNREACHABLE_URL, None).await?;

    app.scheduler.run_once().await.expect("run should not be skipped");
    assert_eq!(app.renderer.render_count(), 2);
    assert_eq!(app.renderer.open_sessions(), 0);
    Ok(())
}

#[tokio::test]
async fn test_alerts_go_to_each_owner() -> anyhow::Result<()> {
    let renderer = StaticPageRenderer::new().with_page(LAPTOP_URL, price_page("$5.00"));
    let app = create_test_app(renderer).await?;
    for owner in ["alice", "bob"] {
        app.store
            .create(NewProduct {
                owner_id: owner.to_string(),
                store: "example.com".to_string(),
                product_name: "laptop".to_string(),
                url: LAPTOP_URL.to_string(),
                price_selector: ".price".to_string(),
                target_price: Some(Decimal::new(1000, 2)),
            })
            .await?;
    }

    let summary = app.scheduler.run_once().await.expect("run should not be skipped");
    assert_eq!(summary.alerts_sent, 2);
    assert_eq!(alerts_to(&app, "alice").len(), 1);
    assert_eq!(alerts_to(&app, "bob").len(), 1);
    Ok(())
}
