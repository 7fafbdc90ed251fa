//! Campaign lifecycle: creation, status changes, deletion.

use backlinkoo_shared::{BacklinkooError, Campaign, CampaignId, CampaignStatus, NewCampaign, Result};
use backlinkoo_storage::Storage;
use tracing::{info, instrument};

/// Validate and store a new campaign as a draft.
#[instrument(skip_all, fields(user_id = %new.user_id))]
pub async fn create_campaign(storage: &Storage, new: NewCampaign) -> Result<Campaign> {
    let new = new.validate()?;
    let campaign = storage.insert_campaign(&new).await?;

    storage
        .log_activity(
            &campaign.id,
            "info",
            &format!(
                "Campaign '{}' created for {} ({} keyword(s), {} anchor(s))",
                campaign.name,
                campaign.target_url,
                campaign.keywords.len(),
                campaign.anchor_texts.len()
            ),
        )
        .await?;

    info!(campaign_id = %campaign.id, "campaign created");
    Ok(campaign)
}

/// Load a campaign or fail with `NotFound`.
pub async fn get_campaign(storage: &Storage, id: &CampaignId) -> Result<Campaign> {
    storage
        .get_campaign(id)
        .await?
        .ok_or_else(|| BacklinkooError::not_found("campaign", id.to_string()))
}

/// Move a campaign to `to` if the lifecycle allows it.
#[instrument(skip_all, fields(campaign_id = %id, to = %to))]
pub async fn transition(storage: &Storage, id: &CampaignId, to: CampaignStatus) -> Result<Campaign> {
    let campaign = get_campaign(storage, id).await?;
    let from = campaign.status;

    if !from.can_transition_to(to) {
        return Err(BacklinkooError::InvalidTransition { from, to });
    }
    if from == to {
        return Ok(campaign);
    }

    storage.update_campaign_status(id, to, None).await?;
    storage
        .log_activity(id, "info", &format!("Status changed: {from} -> {to}"))
        .await?;
    info!(%from, %to, "campaign status changed");

    get_campaign(storage, id).await
}

pub async fn pause(storage: &Storage, id: &CampaignId) -> Result<Campaign> {
    transition(storage, id, CampaignStatus::Paused).await
}

pub async fn resume(storage: &Storage, id: &CampaignId) -> Result<Campaign> {
    transition(storage, id, CampaignStatus::Active).await
}

pub async fn complete(storage: &Storage, id: &CampaignId) -> Result<Campaign> {
    transition(storage, id, CampaignStatus::Completed).await
}

/// Delete a campaign together with its posts and logs.
pub async fn delete_campaign(storage: &Storage, id: &CampaignId) -> Result<()> {
    if storage.delete_campaign(id).await? {
        info!(campaign_id = %id, "campaign deleted");
        Ok(())
    } else {
        Err(BacklinkooError::not_found("campaign", id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("bl_core_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    fn new_campaign() -> NewCampaign {
        NewCampaign {
            user_id: "user-1".into(),
            name: None,
            target_url: "https://example.com".into(),
            keywords: vec!["standing desks".into()],
            anchor_texts: vec!["ergonomic desks".into()],
            model: None,
        }
    }

    #[tokio::test]
    async fn create_validates_and_logs() {
        let storage = test_storage().await;
        let campaign = create_campaign(&storage, new_campaign()).await.unwrap();
        assert_eq!(campaign.status, CampaignStatus::Draft);
        assert_eq!(campaign.name, "standing desks");

        let logs = storage.list_activity(&campaign.id).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert!(logs[0].message.contains("created"));

        let mut bad = new_campaign();
        bad.target_url = "mailto:someone@example.com".into();
        let err = create_campaign(&storage, bad).await.unwrap_err();
        assert!(matches!(err, BacklinkooError::Validation { .. }));
    }

    #[tokio::test]
    async fn lifecycle_transitions() {
        let storage = test_storage().await;
        let c = create_campaign(&storage, new_campaign()).await.unwrap();

        // Draft cannot be paused or completed directly.
        let err = pause(&storage, &c.id).await.unwrap_err();
        assert!(matches!(
            err,
            BacklinkooError::InvalidTransition {
                from: CampaignStatus::Draft,
                to: CampaignStatus::Paused
            }
        ));
        assert!(complete(&storage, &c.id).await.is_err());

        let active = resume(&storage, &c.id).await.unwrap();
        assert_eq!(active.status, CampaignStatus::Active);
        assert!(active.started_at.is_some());

        let paused = pause(&storage, &c.id).await.unwrap();
        assert_eq!(paused.status, CampaignStatus::Paused);

        let done = complete(&storage, &c.id).await.unwrap();
        assert_eq!(done.status, CampaignStatus::Completed);
        assert!(done.completed_at.is_some());

        // Same-state transition is a no-op.
        let again = complete(&storage, &c.id).await.unwrap();
        assert_eq!(again.status, CampaignStatus::Completed);
    }

    #[tokio::test]
    async fn delete_missing_is_not_found() {
        let storage = test_storage().await;
        let c = create_campaign(&storage, new_campaign()).await.unwrap();
        delete_campaign(&storage, &c.id).await.unwrap();

        let err = delete_campaign(&storage, &c.id).await.unwrap_err();
        assert!(matches!(err, BacklinkooError::NotFound { .. }));
        assert!(get_campaign(&storage, &c.id).await.is_err());
    }
}
