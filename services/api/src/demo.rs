use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use clap::Args;
use offer_engine::error::AppError;
use offer_engine::workflows::offers::{
    ActorRole, AuditQuery, Clock, Consents, Contingencies, ContractGateway, ContractPayload,
    CounterTerms, DecisionCommand, DecisionReceipt, DecisionRequest, DocumentKind,
    DocumentUpload, ESignInput, EngineConfig, EntityType, Escalation, FinancingType,
    IntegrationError, IntegrationStatus, ListingAgent, ManualClock, MemoryRecordStore,
    NewProperty, OfferEvent, OfferRevision, OfferSubmission, OfferTerms,
    OfferTransactionService, PropertyId, RequestContext, ScoreRequest, TransactionSpaceId,
    TransitionRequest,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Simulate the contract system being down for the first push attempt.
    #[arg(long)]
    pub(crate) contract_outage: bool,
    /// Accept the strongest offer directly instead of countering first.
    #[arg(long)]
    pub(crate) skip_counter: bool,
}

/// In-process stand-in for the contract system.
#[derive(Debug, Default)]
pub(crate) struct DemoContractSystem {
    outages: AtomicU32,
    opened: AtomicU32,
}

impl DemoContractSystem {
    pub(crate) fn with_outages(outages: u32) -> Self {
        Self {
            outages: AtomicU32::new(outages),
            opened: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl ContractGateway for DemoContractSystem {
    async fn push_contract(
        &self,
        payload: &ContractPayload,
    ) -> Result<TransactionSpaceId, IntegrationError> {
        let down = self
            .outages
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if down {
            return Err(IntegrationError::Transport(
                "contract system unavailable".to_string(),
            ));
        }
        let sequence = self.opened.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(TransactionSpaceId(format!(
            "SS-DEMO-{sequence:03}-{}",
            payload.offer_id
        )))
    }
}

pub(crate) fn demo_listing(now: DateTime<Utc>) -> NewProperty {
    NewProperty {
        property_id: None,
        address: "2217 Larkspur Ln, Boise, ID".to_string(),
        mls_number: "MLS-998120".to_string(),
        listing_price: 549_000,
        listing_agent: ListingAgent {
            name: "Avery Collins".to_string(),
            email: "avery@summitrealty.example".to_string(),
            brokerage: "Summit Realty".to_string(),
        },
        offer_deadline: Some(now + chrono::Duration::days(2)),
    }
}

pub(crate) fn demo_offer(
    property_id: &PropertyId,
    buyer: &str,
    price: u64,
    financing: FinancingType,
    seed: u64,
) -> OfferSubmission {
    let financed = financing.is_financed();
    OfferSubmission {
        property_id: property_id.clone(),
        terms: OfferTerms {
            buyer_names: vec![buyer.to_string()],
            offer_price: price,
            earnest_money: price / 100,
            earnest_money_holder: "Pioneer Title".to_string(),
            financing_type: financing,
            loan_amount: financed.then_some(price / 10 * 8),
            down_payment: financed.then_some(price / 10 * 2),
            closing_date: NaiveDate::from_ymd_opt(2026, 12, 18).unwrap_or_default(),
            possession_terms: "At closing".to_string(),
            contingencies: Contingencies {
                inspection: true,
                inspection_days: Some(7),
                appraisal: financed,
                financing: financed,
                other_text: None,
            },
            escalation: Escalation::default(),
            inclusions_exclusions: "Washer and dryer included".to_string(),
            agent_notes: String::new(),
        },
        documents: vec![DocumentUpload {
            kind: if financed {
                DocumentKind::PreApproval
            } else {
                DocumentKind::ProofOfFunds
            },
            filename: format!("{}-funds.pdf", buyer.to_ascii_lowercase().replace(' ', "-")),
            storage_url: format!("s3://demo-offers/{seed}/funds.pdf"),
            sha256_hash: format!("{seed:064x}"),
        }],
    }
}

fn signed(decision: DecisionCommand) -> DecisionRequest {
    DecisionRequest {
        decision,
        consents: Consents::all_granted(),
        esign: ESignInput {
            typed_name: "Morgan Blake".to_string(),
        },
    }
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        contract_outage,
        skip_counter,
    } = args;

    let clock = Arc::new(ManualClock::new(Utc::now()));
    let gateway = Arc::new(DemoContractSystem::with_outages(u32::from(contract_outage)));
    let config = EngineConfig::default();
    let service = OfferTransactionService::with_clock(
        Arc::new(MemoryRecordStore::new()),
        gateway,
        config.clone(),
        clock.clone(),
    )?;

    let listing_agent =
        RequestContext::new("avery.collins", ActorRole::ListingAgent, "198.51.100.20");
    let buyer_agent = RequestContext::new("jo.park", ActorRole::BuyerAgent, "198.51.100.41");
    let seller = RequestContext::new("seller.morgan", ActorRole::Seller, "192.0.2.77");

    println!("Offer transaction demo");
    let property = service
        .register_property(&listing_agent, demo_listing(clock.now()))
        .await?;
    println!(
        "- Listed {} ({}) at ${} | offers due {}",
        property.property_id,
        property.address,
        property.listing_price,
        property
            .offer_deadline
            .map(|deadline| deadline.to_rfc3339())
            .unwrap_or_else(|| "open".to_string())
    );

    let candidates = [
        ("Riley Chen", 556_000, FinancingType::Conventional),
        ("Dakota Hale", 541_000, FinancingType::Cash),
        ("Sam Ortiz", 560_000, FinancingType::Fha),
    ];
    let mut offers = Vec::new();
    for (seed, (buyer, price, financing)) in candidates.into_iter().enumerate() {
        clock.advance(chrono::Duration::minutes(45));
        let submission =
            demo_offer(&property.property_id, buyer, price, financing, seed as u64 + 1);
        let offer = service.submit_offer(&buyer_agent, submission).await?;
        println!(
            "- Received {} from {} | ${} {}",
            offer.offer_id,
            buyer,
            price,
            financing.label()
        );
        offers.push(offer);
    }

    println!("\nReview and scoring");
    for offer in &offers {
        service
            .transition(
                &listing_agent,
                &offer.offer_id,
                TransitionRequest {
                    event: OfferEvent::StartReview,
                    note: None,
                },
            )
            .await?;
        let score = service
            .score_offer(&listing_agent, &offer.offer_id, ScoreRequest::default())
            .await?;
        println!(
            "- {} computed score {:.2}",
            offer.offer_id, score.computed_score
        );
    }

    let ranking = service.rank_offers(&property.property_id)?;
    println!("\nRanking");
    for row in &ranking {
        println!(
            "  {}. {} ${} | score {} | {}",
            row.rank,
            row.offer_id,
            row.offer_price,
            row.effective_score
                .map(|score| format!("{score:.2}"))
                .unwrap_or_else(|| "unscored".to_string()),
            row.status.label()
        );
    }

    let Some(leader) = ranking.first() else {
        println!("No offers to decide on");
        return Ok(());
    };
    let leader_id = leader.offer_id.clone();

    if !skip_counter {
        let countered = service
            .decide(
                &seller,
                &leader_id,
                signed(DecisionCommand::Counter {
                    terms: CounterTerms {
                        counter_price: Some(leader.offer_price + 4_000),
                        ..CounterTerms::default()
                    },
                }),
            )
            .await?;
        println!(
            "\nSeller countered {} at ${}",
            leader_id,
            leader.offer_price + 4_000
        );
        render_receipt(&countered);

        let mut revised = service.offer(&leader_id)?.terms;
        revised.offer_price = leader.offer_price + 4_000;
        let documents = service
            .offer_status(&leader_id)?
            .current_version
            .documents
            .into_iter()
            .map(|document| DocumentUpload {
                kind: document.kind,
                filename: document.filename,
                storage_url: document.storage_url,
                sha256_hash: document.sha256_hash,
            })
            .collect();
        let offer = service
            .resubmit_offer(
                &buyer_agent,
                &leader_id,
                OfferRevision {
                    terms: revised,
                    documents,
                },
            )
            .await?;
        println!(
            "- Buyer resubmitted {} as {}",
            offer.offer_id, offer.current_version_id
        );
    }

    let receipt = service
        .decide(&seller, &leader_id, signed(DecisionCommand::Accept))
        .await?;
    println!("\nSeller accepted {}", leader_id);
    render_receipt(&receipt);
    for declined in &receipt.cascade_declined {
        println!("  - {} declined automatically", declined);
    }

    if let IntegrationStatus::Pending { .. } = receipt.integration {
        let wait = config.retry.delay_after(1).unwrap_or_default();
        clock.advance(
            chrono::Duration::from_std(wait).unwrap_or_else(|_| chrono::Duration::seconds(1)),
        );
        let summary = service.retry_pending_pushes().await?;
        println!(
            "- Retried contract push: {} attempted, {} confirmed",
            summary.attempted, summary.confirmed
        );
        if let Some(push) = service.contract_pushes(Some(&leader_id))?.first() {
            println!("  Integration now {}", push.status.label());
        }
    }

    println!("\nAudit trail for {}", leader_id);
    let trail = service.query_audit(&AuditQuery::for_entity(
        EntityType::Offer,
        leader_id.as_str(),
    ))?;
    for entry in trail {
        println!(
            "  {} {} by {} ({})",
            entry.created_at.format("%H:%M"),
            entry.action,
            entry.actor_user_id,
            entry.actor_role.label()
        );
    }

    Ok(())
}

fn render_receipt(receipt: &DecisionReceipt) {
    println!(
        "  Decision {} recorded | offer now {}",
        receipt.decision.decision_id,
        receipt.offer.status.label()
    );
    match &receipt.integration {
        IntegrationStatus::Confirmed {
            transaction_space_id,
            ..
        } => println!("  Contract opened as {}", transaction_space_id),
        IntegrationStatus::Pending { reason, .. } => {
            println!("  Contract push pending: {}", reason)
        }
        IntegrationStatus::Failed { reason, .. } => println!("  Contract push failed: {}", reason),
        IntegrationStatus::NotApplicable => {}
    }
}
