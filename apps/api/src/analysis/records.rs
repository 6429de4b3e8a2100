use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::service::current_user;
use crate::auth::Session;
use crate::errors::AppError;
use crate::models::Analysis;
use crate::store::Store;

/// Analysis details reported by the client after a completed run.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordAnalysisRequest {
    pub pdf_file_name: Option<String>,
    pub zip_file_name: Option<String>,
    pub target_tier: Option<String>,
    pub analysis_text: Option<String>,
    pub report_url: Option<String>,
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

pub async fn record_analysis(
    store: &dyn Store,
    session: Session,
    request: RecordAnalysisRequest,
) -> Result<Analysis, AppError> {
    let missing = || AppError::Validation("Missing required fields".to_string());

    let analysis = Analysis {
        id: Uuid::new_v4(),
        user_id: session.user_id,
        pdf_file_name: present(request.pdf_file_name).ok_or_else(missing)?,
        zip_file_name: present(request.zip_file_name),
        target_tier: present(request.target_tier).ok_or_else(missing)?,
        analysis_text: present(request.analysis_text).ok_or_else(missing)?,
        report_url: present(request.report_url),
        payment_id: None,
        created_at: Utc::now(),
    };
    current_user(store, session).await?;
    store.insert_analysis(&analysis).await?;
    Ok(analysis)
}

/// The caller's analyses, newest first.
pub async fn list_analyses(store: &dyn Store, session: Session) -> Result<Vec<Analysis>, AppError> {
    Ok(store.list_analyses(session.user_id).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::User;
    use crate::store::MemoryStore;

    async fn registered(store: &MemoryStore) -> Session {
        let user = User::new("ada".into(), "ada@example.org".into(), "$argon2id$x".into());
        store.insert_user(&user).await.unwrap();
        Session { user_id: user.id }
    }

    fn complete() -> RecordAnalysisRequest {
        RecordAnalysisRequest {
            pdf_file_name: Some("paper.pdf".into()),
            zip_file_name: None,
            target_tier: Some("Q3".into()),
            analysis_text: Some("Strong methodology.".into()),
            report_url: Some("https://example.org/report.pdf".into()),
        }
    }

    #[tokio::test]
    async fn test_record_then_list_is_owner_scoped() {
        let store = MemoryStore::new();
        let session = registered(&store).await;
        let recorded = record_analysis(&store, session, complete()).await.unwrap();

        let mine = list_analyses(&store, session).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].id, recorded.id);

        let other = Session {
            user_id: Uuid::new_v4(),
        };
        assert!(list_analyses(&store, other).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_required_fields() {
        let store = MemoryStore::new();
        let session = Session {
            user_id: Uuid::new_v4(),
        };
        for strip in 0..3 {
            let mut request = complete();
            match strip {
                0 => request.pdf_file_name = None,
                1 => request.target_tier = Some("  ".into()),
                _ => request.analysis_text = None,
            }
            let err = record_analysis(&store, session, request).await.unwrap_err();
            assert!(matches!(err, AppError::Validation(msg) if msg == "Missing required fields"));
        }
    }

    #[tokio::test]
    async fn test_session_without_account_is_unauthorized() {
        let store = MemoryStore::new();
        let stray = Session {
            user_id: Uuid::new_v4(),
        };
        let err = record_analysis(&store, stray, complete()).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
        assert!(list_analyses(&store, stray).await.unwrap().is_empty());
    }
}
