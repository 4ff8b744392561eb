// Copyright 2024 TFAS Developers.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use ethers::prelude::abigen;

// Typed bindings for the on-chain fund-allocation ledger. The events and
// view structs derive serde so that raw events can be hashed for the
// at-least-once deduplication in the event relay.
abigen!(
    FundAllocationContract,
    r#"[
        {
            "type": "function",
            "name": "getProjects",
            "stateMutability": "view",
            "inputs": [],
            "outputs": [
                {
                    "name": "",
                    "type": "tuple[]",
                    "internalType": "struct FundAllocation.ProjectView[]",
                    "components": [
                        { "name": "id", "type": "uint256", "internalType": "uint256" },
                        { "name": "name", "type": "string", "internalType": "string" },
                        { "name": "budget", "type": "uint256", "internalType": "uint256" },
                        { "name": "status", "type": "uint8", "internalType": "uint8" },
                        { "name": "timeline", "type": "string", "internalType": "string" },
                        { "name": "owner", "type": "address", "internalType": "address" }
                    ]
                }
            ]
        },
        {
            "type": "function",
            "name": "getProject",
            "stateMutability": "view",
            "inputs": [
                { "name": "projectId", "type": "uint256", "internalType": "uint256" }
            ],
            "outputs": [
                {
                    "name": "",
                    "type": "tuple",
                    "internalType": "struct FundAllocation.ProjectView",
                    "components": [
                        { "name": "id", "type": "uint256", "internalType": "uint256" },
                        { "name": "name", "type": "string", "internalType": "string" },
                        { "name": "budget", "type": "uint256", "internalType": "uint256" },
                        { "name": "status", "type": "uint8", "internalType": "uint8" },
                        { "name": "timeline", "type": "string", "internalType": "string" },
                        { "name": "owner", "type": "address", "internalType": "address" }
                    ]
                }
            ]
        },
        {
            "type": "function",
            "name": "getMilestones",
            "stateMutability": "view",
            "inputs": [
                { "name": "projectId", "type": "uint256", "internalType": "uint256" }
            ],
            "outputs": [
                {
                    "name": "",
                    "type": "tuple[]",
                    "internalType": "struct FundAllocation.MilestoneView[]",
                    "components": [
                        { "name": "id", "type": "uint256", "internalType": "uint256" },
                        { "name": "description", "type": "string", "internalType": "string" },
                        { "name": "status", "type": "uint8", "internalType": "uint8" },
                        { "name": "proofUri", "type": "string", "internalType": "string" }
                    ]
                }
            ]
        },
        {
            "type": "event",
            "name": "ProjectCreated",
            "anonymous": false,
            "inputs": [
                { "name": "projectId", "type": "uint256", "indexed": true },
                { "name": "name", "type": "string", "indexed": false },
                { "name": "owner", "type": "address", "indexed": true }
            ]
        },
        {
            "type": "event",
            "name": "MilestoneChanged",
            "anonymous": false,
            "inputs": [
                { "name": "projectId", "type": "uint256", "indexed": true },
                { "name": "milestoneId", "type": "uint256", "indexed": false },
                { "name": "status", "type": "uint8", "indexed": false },
                { "name": "proofUri", "type": "string", "indexed": false }
            ]
        },
        {
            "type": "event",
            "name": "FeedbackSubmitted",
            "anonymous": false,
            "inputs": [
                { "name": "projectId", "type": "uint256", "indexed": true },
                { "name": "author", "type": "address", "indexed": true },
                { "name": "feedback", "type": "string", "indexed": false }
            ]
        }
    ]"#,
    derives(serde::Deserialize, serde::Serialize)
);
