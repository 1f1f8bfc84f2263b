mod harness;

use fpd_core::domain::randomness::finality_sig_message;
use fpd_core::infrastructure::chain::ClientController;
use fpd_core::infrastructure::signer::EotsManager;
use fpd_core::infrastructure::storage::ProviderStore;
use harness::wait::eventually;
use harness::{TestHarness, TEST_PUB_RAND_NUM};

// The stored cursor is behind a vote that already landed on chain, the
// finalized tip is far ahead: one batch covers the whole gap, the chain
// skips the duplicate entry, and the cursors land on the tip.
#[tokio::test]
async fn fast_sync_catches_up_across_a_duplicate_vote() {
    let tm = TestHarness::new(TestHarness::fast_config());
    let btc_pk = tm.create_and_register_provider("fast-sync").await;
    tm.chain.set_voting_power(&btc_pk, 1, 100).unwrap();

    // a vote at height 3 is already on chain...
    tm.chain.advance_to_height(3).unwrap();
    let scheduler = tm.scheduler();
    scheduler.commit(&btc_pk, &tm.chain_id(), 1, TEST_PUB_RAND_NUM).await.unwrap();
    let block3 = tm.chain.block_at_height(3).unwrap();
    let msg = finality_sig_message(3, &block3.hash);
    let pub_rand = tm
        .signer
        .create_randomness_pair_list(&btc_pk, &tm.chain_id(), 3, 1)
        .await
        .unwrap()[0];
    let signature = tm.signer.sign_eots(&btc_pk, &tm.chain_id(), 3, &msg).await.unwrap();
    tm.chain.submit_finality_sig(&btc_pk, &block3, &pub_rand, &signature).await.unwrap();

    // ...but the store only remembers height 2
    tm.store.set_heights(&btc_pk, 2, 2).unwrap();

    // the chain moves on and finalizes well past the gap
    tm.chain.advance_to_height(10).unwrap();
    tm.chain.set_finalized_height(10).unwrap();

    let instance = tm.start_instance(&btc_pk).await;
    {
        let instance = instance.clone();
        eventually("cursors caught up to the finalized tip", move || {
            instance.last_voted_height() == 10 && instance.last_processed_height() == 10
        })
        .await;
    }
    instance.stop().await.unwrap();

    let stored = tm.stored_record(&btc_pk);
    assert_eq!(stored.last_voted_height, 10);
    assert_eq!(stored.last_processed_height, 10);

    // every height in the gap is voted exactly once
    let votes = tm.chain.votes_of(&btc_pk).unwrap();
    let heights: Vec<u64> = votes.iter().map(|(height, _)| *height).collect();
    assert_eq!(heights, (3..=10).collect::<Vec<u64>>());
}

// Re-running the catch-up over the same gap must not move the cursors or
// resubmit anything.
#[tokio::test]
async fn fast_sync_is_idempotent_across_restarts() {
    let tm = TestHarness::new(TestHarness::fast_config());
    let btc_pk = tm.create_and_register_provider("fast-sync-idem").await;
    tm.chain.set_voting_power(&btc_pk, 1, 100).unwrap();
    tm.chain.advance_to_height(8).unwrap();
    tm.chain.set_finalized_height(8).unwrap();

    let instance = tm.start_instance(&btc_pk).await;
    {
        let instance = instance.clone();
        eventually("first catch-up done", move || instance.last_processed_height() == 8).await;
    }
    instance.stop().await.unwrap();
    tm.app.stop_instance(&btc_pk).await.unwrap();

    let votes_before = tm.chain.votes_of(&btc_pk).unwrap();
    let stored_before = tm.stored_record(&btc_pk);

    // restart over the same gap
    let instance = tm.start_instance(&btc_pk).await;
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    instance.stop().await.unwrap();

    let stored_after = tm.stored_record(&btc_pk);
    assert_eq!(stored_before.last_voted_height, stored_after.last_voted_height);
    assert_eq!(stored_before.last_processed_height, stored_after.last_processed_height);
    assert_eq!(votes_before, tm.chain.votes_of(&btc_pk).unwrap());
}
