use super::*;
use price_watch::AppError;
use price_watch::wizard::WizardOutcome;

fn answer(app: &TestApp, replies: &[&str]) {
    for reply in replies {
        app.channel.push_reply(OWNER, *reply);
    }
}

#[tokio::test]
async fn test_wizard_creates_product_and_it_is_polled() -> anyhow::Result<()> {
    let renderer = StaticPageRenderer::new().with_page(LAPTOP_URL, price_page("$19.99 CAD"));
    let app = create_test_app(renderer).await?;
    answer(&app, &["example.com", "laptop", LAPTOP_URL, "20.00"]);

    let outcome = app.wizard.run(OWNER).await?;
    assert!(matches!(outcome, WizardOutcome::Completed(_)));

    let product = app.store.get(OWNER, "laptop").await?;
    assert_eq!(product.price_selector, ".price");
    assert_eq!(product.target_price, Some(Decimal::new(2000, 2)));

    let summary = app.scheduler.run_once().await.expect("run should not be skipped");
    assert_eq!(summary.alerts_sent, 1);
    Ok(())
}

#[tokio::test]
async fn test_idle_wizard_saves_nothing() -> anyhow::Result<()> {
    let renderer = StaticPageRenderer::new().with_page(LAPTOP_URL, price_page("$19.99"));
    let app = create_test_app_with(renderer, Duration::from_millis(150)).await?;

    // Three of four answers, then silence
    answer(&app, &["example.com", "laptop", LAPTOP_URL]);

    let outcome = app.wizard.run(OWNER).await?;
    assert_eq!(outcome, WizardOutcome::Cancelled);
    assert!(app.store.scan_all().await?.is_empty());
    assert!(!app.bot.is_wizard_active(OWNER));
    Ok(())
}

#[tokio::test]
async fn test_second_wizard_rejected_while_first_runs() -> anyhow::Result<()> {
    let renderer = StaticPageRenderer::new().with_page(LAPTOP_URL, price_page("$19.99"));
    let app = create_test_app(renderer).await?;

    let first = app.bot.start_wizard(OWNER)?;
    assert!(app.bot.is_wizard_active(OWNER));

    let err = app.bot.start_wizard(OWNER).unwrap_err();
    assert!(matches!(err, AppError::SessionActive { .. }));
    assert!(app.bot.is_wizard_active(OWNER));

    answer(&app, &["example.com", "laptop", LAPTOP_URL, "25"]);
    let outcome = first.await?;
    assert!(matches!(outcome, WizardOutcome::Completed(_)));

    let bot = app.bot.clone();
    assert!(wait_for_condition(move || !bot.is_wizard_active(OWNER), Duration::from_secs(1)).await);
    Ok(())
}

#[tokio::test]
async fn test_wizard_for_other_owner_is_independent() -> anyhow::Result<()> {
    let app = create_test_app_with(StaticPageRenderer::new(), Duration::from_millis(200)).await?;

    let _alice = app.bot.start_wizard(OWNER)?;
    let bob = app.bot.start_wizard("bob")?;

    assert!(app.bot.is_wizard_active(OWNER));
    assert!(app.bot.is_wizard_active("bob"));
    assert_eq!(bob.await?, WizardOutcome::Cancelled);
    Ok(())
}

#[tokio::test]
async fn test_wizard_with_unreachable_url_fails() -> anyhow::Result<()> {
    let app = create_test_app(StaticPageRenderer::new()).await?;
    answer(&app, &["example.com", "phone", UNREACHABLE_URL, "100"]);

    let outcome = app.wizard.run(OWNER).await?;
    assert!(matches!(outcome, WizardOutcome::Failed(_)));
    assert!(app.store.list(OWNER).await?.is_empty());

    let last = app.channel.last_message_to(OWNER).unwrap_or_default();
    assert!(last.contains("could not fetch"));
    Ok(())
}
