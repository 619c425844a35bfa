//! Service-level tests over the in-memory stores.
//!
//! Verifies:
//! - the debt flag follows every fee write
//! - the download gate (admin override, ownership, alumni debt)
//! - verification fields always move together

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use registrar_auth::{Hs256JwtValidator, RegistrationForm, Role, Sha256PasswordHasher, User};
    use registrar_core::{DomainError, Money};
    use registrar_documents::DocumentType;
    use registrar_policy::DenialKind;

    use crate::content::InMemoryContentStore;
    use crate::error::ServiceError;
    use crate::identity::{BootstrapAdmin, IdentityService};
    use crate::ledger::{FeeChanges, FeeLedger, NewFee};
    use crate::registry::{DocumentRegistry, NewDocument};
    use crate::store::{InMemoryRecordStore, RecordStore};

    struct Harness {
        store: Arc<InMemoryRecordStore>,
        identity: IdentityService,
        ledger: FeeLedger,
        registry: DocumentRegistry,
        admin: User,
    }

    async fn setup() -> Harness {
        let store = Arc::new(InMemoryRecordStore::new());
        let content = Arc::new(InMemoryContentStore::new());
        let identity = IdentityService::new(
            store.clone(),
            content.clone(),
            Arc::new(Hs256JwtValidator::new(b"integration".to_vec())),
        )
        .with_hasher(Arc::new(Sha256PasswordHasher::with_rounds(16)));
        let ledger = FeeLedger::new(store.clone());
        let registry = DocumentRegistry::new(store.clone(), content);
        let admin = identity
            .ensure_bootstrap_admin(&BootstrapAdmin {
                username: "carol".to_string(),
                email: "carol@example.edu".to_string(),
                password: "admin-password".to_string(),
            })
            .await
            .unwrap();
        Harness {
            store,
            identity,
            ledger,
            registry,
            admin,
        }
    }

    impl Harness {
        async fn register(&self, username: &str, role: Role) -> User {
            self.identity
                .register(RegistrationForm {
                    username: username.to_string(),
                    email: format!("{username}@example.edu"),
                    password: "long-enough".to_string(),
                    password_confirm: "long-enough".to_string(),
                    display_name: None,
                    role,
                })
                .await
                .unwrap()
        }

        /// Current stored state, as the API middleware would load it.
        async fn fresh(&self, user: &User) -> User {
            self.store.get_user(user.id).await.unwrap().unwrap()
        }

        async fn upload(&self, owner: &User) -> registrar_documents::Document {
            self.registry
                .upload(
                    owner,
                    NewDocument {
                        title: "Transcript".to_string(),
                        document_type: DocumentType::Transcript,
                        filename: "transcript.pdf".to_string(),
                        bytes: b"%PDF-1.7 transcript".to_vec(),
                    },
                )
                .await
                .unwrap()
        }

        async fn charge(&self, owner: &User, amount: &str) -> registrar_fees::Fee {
            self.ledger
                .create_fee(
                    &self.admin,
                    NewFee {
                        owner: owner.id,
                        description: "Graduation dues".to_string(),
                        amount: amount.parse().unwrap(),
                        due_date: None,
                    },
                )
                .await
                .unwrap()
        }
    }

    fn denial_kind(err: ServiceError) -> DenialKind {
        match err {
            ServiceError::Denied(d) => d.kind,
            other => panic!("expected a denial, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn alumni_with_unpaid_fee_is_blocked_until_paid() {
        let h = setup().await;
        let alice = h.register("alice", Role::Alumni).await;
        let doc = h.upload(&alice).await;
        let fee = h.charge(&alice, "50.00").await;

        let alice = h.fresh(&alice).await;
        assert_eq!(h.ledger.total_debt(alice.id).await.unwrap(), Money::from_cents(5000));
        assert!(alice.owes_fees());
        let err = h.registry.download(&alice, doc.id_typed()).await.unwrap_err();
        assert_eq!(denial_kind(err), DenialKind::OutstandingFees);

        let paid = h.ledger.mark_paid(&h.admin, fee.id_typed()).await.unwrap();
        assert!(paid.is_paid());
        assert!(paid.paid_date().is_some());

        let alice = h.fresh(&alice).await;
        assert_eq!(h.ledger.total_debt(alice.id).await.unwrap(), Money::ZERO);
        assert!(!alice.owes_fees());
        let download = h.registry.download(&alice, doc.id_typed()).await.unwrap();
        assert_eq!(download.bytes, b"%PDF-1.7 transcript");
        assert_eq!(download.filename, "transcript.pdf");
    }

    #[tokio::test]
    async fn student_with_debt_can_download() {
        let h = setup().await;
        let bob = h.register("bob", Role::Student).await;
        let doc = h.upload(&bob).await;
        h.charge(&bob, "100.00").await;

        let bob = h.fresh(&bob).await;
        assert!(bob.owes_fees());
        assert!(h.registry.download(&bob, doc.id_typed()).await.is_ok());
    }

    #[tokio::test]
    async fn admin_downloads_other_users_document() {
        let h = setup().await;
        let alice = h.register("alice", Role::Alumni).await;
        let doc = h.upload(&alice).await;
        h.charge(&alice, "10.00").await;

        assert!(h.registry.download(&h.admin, doc.id_typed()).await.is_ok());
    }

    #[tokio::test]
    async fn non_owner_is_refused_regardless_of_debt() {
        let h = setup().await;
        let alice = h.register("alice", Role::Alumni).await;
        let dave = h.register("dave", Role::Alumni).await;
        let doc = h.upload(&alice).await;

        let err = h.registry.download(&dave, doc.id_typed()).await.unwrap_err();
        assert_eq!(denial_kind(err), DenialKind::NotOwner);
    }

    #[tokio::test]
    async fn zero_amount_fee_is_rejected_without_side_effects() {
        let h = setup().await;
        let alice = h.register("alice", Role::Alumni).await;

        let err = h
            .ledger
            .create_fee(
                &h.admin,
                NewFee {
                    owner: alice.id,
                    description: "Nothing".to_string(),
                    amount: Money::ZERO,
                    due_date: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Domain(DomainError::Validation(_))));
        assert!(h.ledger.list(&h.admin).await.unwrap().is_empty());
        assert!(!h.fresh(&alice).await.owes_fees());
    }

    #[tokio::test]
    async fn unpaid_total_is_capped_without_side_effects() {
        let h = setup().await;
        let alice = h.register("alice", Role::Alumni).await;
        let new_fee = |amount: Money| NewFee {
            owner: alice.id,
            description: "Late fee".to_string(),
            amount,
            due_date: None,
        };

        let huge: Money = "184467440737095516.15".parse().unwrap();
        let err = h.ledger.create_fee(&h.admin, new_fee(huge)).await.unwrap_err();
        assert!(matches!(err, ServiceError::Domain(DomainError::Validation(_))));

        let fee = h.charge(&alice, &Money::MAX_CHARGE.to_string()).await;
        let err = h
            .ledger
            .create_fee(&h.admin, new_fee(Money::MIN_CHARGE))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Domain(DomainError::Validation(_))));
        assert_eq!(h.ledger.list(&h.admin).await.unwrap().len(), 1);
        assert_eq!(h.ledger.total_debt(alice.id).await.unwrap(), Money::MAX_CHARGE);

        h.ledger.mark_paid(&h.admin, fee.id_typed()).await.unwrap();
        h.ledger.create_fee(&h.admin, new_fee(Money::MIN_CHARGE)).await.unwrap();
        assert!(h.fresh(&alice).await.owes_fees());

        let err = h.ledger.mark_unpaid(&h.admin, fee.id_typed()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Domain(DomainError::Validation(_))));
        assert!(h.ledger.get(&h.admin, fee.id_typed()).await.unwrap().is_paid());
        assert_eq!(h.ledger.total_debt(alice.id).await.unwrap(), Money::MIN_CHARGE);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_fee_writes_keep_flag_consistent() {
        let h = Arc::new(setup().await);
        let alice = h.register("alice", Role::Alumni).await;

        let mut writers = tokio::task::JoinSet::new();
        for worker in 0..8u64 {
            let h = h.clone();
            let owner = alice.id;
            writers.spawn(async move {
                let mut fees = Vec::new();
                for round in 0..10u64 {
                    let fee = h
                        .ledger
                        .create_fee(
                            &h.admin,
                            NewFee {
                                owner,
                                description: format!("Dues {worker}-{round}"),
                                amount: Money::from_cents(100 + worker),
                                due_date: None,
                            },
                        )
                        .await
                        .unwrap();
                    h.ledger.mark_paid(&h.admin, fee.id_typed()).await.unwrap();
                    if round % 2 == 0 {
                        h.ledger.mark_unpaid(&h.admin, fee.id_typed()).await.unwrap();
                    }
                    fees.push(fee.id_typed());
                }
                fees
            });
        }
        let mut fees = Vec::new();
        while let Some(done) = writers.join_next().await {
            fees.extend(done.unwrap());
        }

        // Five unpaid fees per worker, worker `w` charging 100 + w cents.
        let total = h.ledger.total_debt(alice.id).await.unwrap();
        assert_eq!(total, Money::from_cents(5 * (100..108).sum::<u64>()));
        assert_eq!(h.fresh(&alice).await.owes_fees(), !total.is_zero());

        let mut payers = tokio::task::JoinSet::new();
        for id in fees {
            let h = h.clone();
            payers.spawn(async move { h.ledger.mark_paid(&h.admin, id).await.map(|_| ()) });
        }
        while let Some(done) = payers.join_next().await {
            done.unwrap().unwrap();
        }

        let total = h.ledger.total_debt(alice.id).await.unwrap();
        assert!(total.is_zero());
        assert_eq!(h.fresh(&alice).await.owes_fees(), !total.is_zero());
    }

    #[tokio::test]
    async fn fee_for_missing_owner_is_not_found() {
        let h = setup().await;
        let err = h
            .ledger
            .create_fee(
                &h.admin,
                NewFee {
                    owner: registrar_core::UserId::new(),
                    description: "Dues".to_string(),
                    amount: Money::from_cents(100),
                    due_date: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Domain(DomainError::NotFound("user"))));
    }

    #[tokio::test]
    async fn non_admin_cannot_manage_fees_or_verify() {
        let h = setup().await;
        let alice = h.register("alice", Role::Alumni).await;
        let fee = h.charge(&alice, "5.00").await;
        let doc = h.upload(&alice).await;

        let err = h.ledger.mark_paid(&alice, fee.id_typed()).await.unwrap_err();
        assert_eq!(denial_kind(err), DenialKind::AdminRequired);
        let err = h.registry.verify(&alice, doc.id_typed()).await.unwrap_err();
        assert_eq!(denial_kind(err), DenialKind::AdminRequired);
    }

    #[tokio::test]
    async fn flag_tracks_edits_unpay_and_delete() {
        let h = setup().await;
        let alice = h.register("alice", Role::Alumni).await;
        let fee = h.charge(&alice, "20.00").await;

        h.ledger.set_paid(&h.admin, fee.id_typed(), true).await.unwrap();
        assert!(!h.fresh(&alice).await.owes_fees());

        let unpaid = h.ledger.set_paid(&h.admin, fee.id_typed(), false).await.unwrap();
        assert!(unpaid.paid_date().is_none());
        assert!(h.fresh(&alice).await.owes_fees());
        assert_eq!(h.ledger.total_debt(alice.id).await.unwrap(), Money::from_cents(2000));

        h.ledger
            .edit_fee(
                &h.admin,
                fee.id_typed(),
                FeeChanges {
                    amount: Some(Money::from_cents(750)),
                    ..FeeChanges::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(h.ledger.total_debt(alice.id).await.unwrap(), Money::from_cents(750));

        h.ledger.delete_fee(&h.admin, fee.id_typed()).await.unwrap();
        assert!(!h.fresh(&alice).await.owes_fees());
        assert!(!h.ledger.has_outstanding_debt(alice.id).await.unwrap());
    }

    #[tokio::test]
    async fn repeated_mark_paid_keeps_first_payment() {
        let h = setup().await;
        let alice = h.register("alice", Role::Alumni).await;
        let fee = h.charge(&alice, "1.00").await;

        let first = h.ledger.mark_paid(&h.admin, fee.id_typed()).await.unwrap();
        let second = h.ledger.mark_paid(&h.admin, fee.id_typed()).await.unwrap();
        assert_eq!(first.paid_date(), second.paid_date());
        assert_eq!(
            registrar_core::AggregateRoot::version(&first),
            registrar_core::AggregateRoot::version(&second)
        );
    }

    #[tokio::test]
    async fn verify_unverify_round_trip_through_store() {
        let h = setup().await;
        let alice = h.register("alice", Role::Alumni).await;
        let doc = h.upload(&alice).await;

        let verified = h.registry.verify(&h.admin, doc.id_typed()).await.unwrap();
        let v = verified.verification();
        assert!(v.is_verified());
        assert_eq!(v.verified_by(), Some(h.admin.id));
        assert!(v.verified_at().is_some());

        let again = h.registry.verify(&h.admin, doc.id_typed()).await.unwrap();
        assert!(again.verification().verified_at() >= v.verified_at());

        let cleared = h.registry.unverify(&h.admin, doc.id_typed()).await.unwrap();
        assert_eq!(cleared.verification(), doc.verification());
        assert_eq!(cleared.title(), doc.title());
        assert_eq!(cleared.file_size(), doc.file_size());

        let stored = h.registry.get(&alice, doc.id_typed()).await.unwrap();
        assert!(!stored.is_verified());
        assert_eq!(stored.verification().verified_by(), None);
    }

    #[tokio::test]
    async fn verify_missing_document_is_not_found() {
        let h = setup().await;
        let err = h
            .registry
            .verify(&h.admin, registrar_core::DocumentId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Domain(DomainError::NotFound("document"))));
    }

    #[tokio::test]
    async fn deleting_verifier_reverts_their_verifications() {
        let h = setup().await;
        let alice = h.register("alice", Role::Alumni).await;
        let doc = h.upload(&alice).await;

        let second_admin = h.register("erin", Role::Student).await;
        let second_admin = h
            .identity
            .change_role(&h.admin, second_admin.id, Role::Admin)
            .await
            .unwrap();
        h.registry.verify(&second_admin, doc.id_typed()).await.unwrap();

        h.identity.delete_user(&h.admin, second_admin.id).await.unwrap();
        let stored = h.registry.get(&alice, doc.id_typed()).await.unwrap();
        assert!(!stored.is_verified());
        assert_eq!(stored.verification().verified_by(), None);
        assert_eq!(stored.verification().verified_at(), None);
    }

    #[tokio::test]
    async fn deleting_owner_removes_documents_and_content() {
        let h = setup().await;
        let alice = h.register("alice", Role::Alumni).await;
        let doc = h.upload(&alice).await;
        h.charge(&alice, "3.00").await;

        h.identity.delete_user(&h.admin, alice.id).await.unwrap();
        assert!(h.registry.list(&h.admin).await.unwrap().is_empty());
        assert!(h.ledger.list(&h.admin).await.unwrap().is_empty());
        let err = h.registry.get(&h.admin, doc.id_typed()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Domain(DomainError::NotFound(_))));
    }

    #[tokio::test]
    async fn users_only_list_their_own_records() {
        let h = setup().await;
        let alice = h.register("alice", Role::Alumni).await;
        let bob = h.register("bob", Role::Student).await;
        h.upload(&alice).await;
        h.upload(&bob).await;
        h.charge(&bob, "4.00").await;

        assert_eq!(h.registry.list(&alice).await.unwrap().len(), 1);
        assert_eq!(h.registry.list(&h.admin).await.unwrap().len(), 2);
        assert!(h.ledger.list(&alice).await.unwrap().is_empty());

        let err = h.ledger.list_for_owner(&alice, bob.id).await.unwrap_err();
        assert_eq!(denial_kind(err), DenialKind::NotOwner);
        let summary = h.ledger.debt_summary(&bob, bob.id).await.unwrap();
        assert_eq!(summary.total_debt, Money::from_cents(400));
        assert_eq!(summary.unpaid_count, 1);
    }

    #[tokio::test]
    async fn empty_title_upload_stores_nothing() {
        let h = setup().await;
        let alice = h.register("alice", Role::Alumni).await;
        let err = h
            .registry
            .upload(
                &alice,
                NewDocument {
                    title: " ".to_string(),
                    document_type: DocumentType::Other,
                    filename: "a.pdf".to_string(),
                    bytes: vec![1, 2, 3],
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Domain(DomainError::Validation(_))));
        assert!(h.registry.list(&alice).await.unwrap().is_empty());
    }
}
