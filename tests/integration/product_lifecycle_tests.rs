use super::*;
use price_watch::AppError;
use price_watch::bot::Command;

#[tokio::test]
async fn test_complete_product_lifecycle() -> anyhow::Result<()> {
    let renderer = StaticPageRenderer::new().with_page(LAPTOP_URL, price_page("$19.99 CAD"));
    let app = create_test_app(renderer).await?;

    // 1. Create
    track(&app, "laptop", LAPTOP_URL, Some(Decimal::new(2000, 2))).await?;

    // 2. Read back
    let product = app.store.get(OWNER, "laptop").await?;
    assert_eq!(product.url, LAPTOP_URL);
    assert_eq!(product.price_selector, ".price");

    // 3. Manual check
    let reply = app.bot.check_price(OWNER, "laptop").await?;
    assert!(reply.contains("Current Price: $19.99"));
    assert!(reply.contains("Target Price: $20.00"));

    // 4. Change target
    let updated = app.store.update_target(OWNER, "laptop", Some(Decimal::new(1500, 2))).await?;
    assert_eq!(updated.target_price, Some(Decimal::new(1500, 2)));

    // 5. Listing shows the new target
    let listing = app.bot.list(OWNER).await?;
    assert!(listing.contains("$15.00"));

    // 6. Delete
    app.store.delete(OWNER, "laptop").await?;
    assert!(matches!(app.store.get(OWNER, "laptop").await, Err(AppError::NotFound { .. })));

    Ok(())
}

#[tokio::test]
async fn test_duplicate_create_keeps_original() -> anyhow::Result<()> {
    let app = create_test_app(StaticPageRenderer::new()).await?;
    track(&app, "laptop", LAPTOP_URL, Some(Decimal::new(2000, 2))).await?;

    let second = track(&app, "laptop", "https://example.com/other", None).await;
    let err = second.unwrap_err();
    assert!(matches!(err.downcast_ref::<AppError>(), Some(AppError::Duplicate { .. })));

    let product = app.store.get(OWNER, "laptop").await?;
    assert_eq!(product.url, LAPTOP_URL);
    assert_eq!(product.target_price, Some(Decimal::new(2000, 2)));
    Ok(())
}

#[tokio::test]
async fn test_delete_missing_product_changes_nothing() -> anyhow::Result<()> {
    let app = create_test_app(StaticPageRenderer::new()).await?;
    track(&app, "laptop", LAPTOP_URL, None).await?;

    let err = app.store.delete(OWNER, "phone").await.unwrap_err();
    assert!(matches!(err, AppError::NotFound { .. }));
    assert_eq!(app.store.scan_all().await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_unreachable_manual_check() -> anyhow::Result<()> {
    let app = create_test_app(StaticPageRenderer::new()).await?;
    track(&app, "phone", UNREACHABLE_URL, Some(Decimal::ONE_HUNDRED)).await?;

    let reply = app.bot.handle(OWNER, Command::parse("check phone")?).await;
    assert_eq!(reply.as_deref(), Some("Could not fetch the price for 'phone'."));
    Ok(())
}

#[tokio::test]
async fn test_console_commands() -> anyhow::Result<()> {
    let renderer = StaticPageRenderer::new().with_page(LAPTOP_URL, price_page("$19.99"));
    let app = create_test_app(renderer).await?;
    track(&app, "laptop", LAPTOP_URL, Some(Decimal::new(2000, 2))).await?;

    let reply = app.bot.handle(OWNER, Command::parse("target laptop 18")?).await;
    assert_eq!(reply.as_deref(), Some("Target for 'laptop' set to $18.00."));

    let reply = app.bot.handle(OWNER, Command::parse("target laptop none")?).await;
    assert_eq!(reply.as_deref(), Some("Target for 'laptop' cleared."));

    let reply = app.bot.handle(OWNER, Command::parse("remove laptop")?).await;
    assert_eq!(reply.as_deref(), Some("Stopped tracking 'laptop'."));

    let reply = app.bot.handle(OWNER, Command::parse("list")?).await.unwrap_or_default();
    assert!(reply.contains("not tracking"));
    Ok(())
}

#[tokio::test]
async fn test_products_are_scoped_to_owner() -> anyhow::Result<()> {
    let app = create_test_app(StaticPageRenderer::new()).await?;
    track(&app, "laptop", LAPTOP_URL, None).await?;

    assert!(app.store.list("bob").await?.is_empty());
    assert!(matches!(app.store.get("bob", "laptop").await, Err(AppError::NotFound { .. })));
    assert!(app.store.delete("bob", "laptop").await.is_err());
    assert!(app.store.get(OWNER, "laptop").await.is_ok());
    Ok(())
}
